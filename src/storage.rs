use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional};
use thiserror::Error;

use crate::models::{Attribute, Recipe, RecipeChanges, User, UserChanges, UserId};
use crate::query::RecipeFilter;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("email already registered: {0}")]
    EmailTaken(String),
    #[error("record not found")]
    NotFound,
}

impl From<TransactionError<StorageError>> for StorageError {
    fn from(err: TransactionError<StorageError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StorageError::Sled(e),
        }
    }
}

/// Which attribute tree an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Tag,
    Ingredient,
}

#[derive(Clone)]  // Sled handles are cheap to clone and thread-safe
pub struct Storage {
    db: Db,
    // One tree per record type, keyed by big-endian id so iteration
    // follows creation order. `user_emails` maps email -> user id key.
    users: sled::Tree,
    user_emails: sled::Tree,
    tags: sled::Tree,
    ingredients: sled::Tree,
    recipes: sled::Tree,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(value)?)
}

fn abort<T>(err: StorageError) -> ConflictableTransactionResult<T, StorageError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn tx_decode<T: DeserializeOwned>(bytes: &[u8]) -> ConflictableTransactionResult<T, StorageError> {
    serde_json::from_slice(bytes).or_else(|e| abort(StorageError::Encoding(e)))
}

fn tx_encode<T: Serialize>(value: &T) -> ConflictableTransactionResult<Vec<u8>, StorageError> {
    serde_json::to_vec(value).or_else(|e| abort(StorageError::Encoding(e)))
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop; used by tests and dry runs.
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let users = db.open_tree("users")?;
        let user_emails = db.open_tree("user_emails")?;
        let tags = db.open_tree("tags")?;
        let ingredients = db.open_tree("ingredients")?;
        let recipes = db.open_tree("recipes")?;
        Ok(Self {
            db,
            users,
            user_emails,
            tags,
            ingredients,
            recipes,
        })
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        // generate_id starts at 0; public ids start at 1
        Ok(self.db.generate_id()? + 1)
    }

    fn attribute_tree(&self, kind: AttributeKind) -> &sled::Tree {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }

    // --- Users ---

    /// Insert a user; the email index and the record are written in one
    /// transaction so a taken email never leaves an orphan record.
    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        is_staff: bool,
        is_superuser: bool,
    ) -> Result<User, StorageError> {
        let user = User {
            id: self.next_id()?,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            is_active: true,
            is_staff,
            is_superuser,
        };
        let key = id_key(user.id);
        let bytes = encode(&user)?;

        (&self.users, &self.user_emails).transaction(
            |(users, emails)| -> ConflictableTransactionResult<(), StorageError> {
                if emails.get(email.as_bytes())?.is_some() {
                    return abort(StorageError::EmailTaken(email.to_string()));
                }
                emails.insert(email.as_bytes(), &key[..])?;
                users.insert(&key[..], bytes.clone())?;
                Ok(())
            },
        )?;
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        self.users
            .get(id_key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        match self.user_emails.get(email.as_bytes())? {
            Some(key) => self.users.get(key)?.map(|bytes| decode(&bytes)).transpose(),
            None => Ok(None),
        }
    }

    pub fn update_user(&self, id: UserId, changes: UserChanges) -> Result<User, StorageError> {
        let key = id_key(id);
        let updated = (&self.users, &self.user_emails).transaction(
            |(users, emails)| -> ConflictableTransactionResult<User, StorageError> {
                let Some(bytes) = users.get(&key[..])? else {
                    return abort(StorageError::NotFound);
                };
                let mut user: User = tx_decode(&bytes)?;

                if let Some(email) = changes.email.as_ref().filter(|e| **e != user.email) {
                    if emails.get(email.as_bytes())?.is_some() {
                        return abort(StorageError::EmailTaken(email.clone()));
                    }
                    emails.remove(user.email.as_bytes())?;
                    emails.insert(email.as_bytes(), &key[..])?;
                    user.email = email.clone();
                }
                if let Some(hash) = &changes.password_hash {
                    user.password_hash = hash.clone();
                }
                if let Some(name) = &changes.name {
                    user.name = name.clone();
                }
                users.insert(&key[..], tx_encode(&user)?)?;
                Ok(user)
            },
        )?;
        Ok(updated)
    }

    // --- Tags / ingredients ---

    pub fn create_attribute(
        &self,
        kind: AttributeKind,
        owner_id: UserId,
        name: &str,
    ) -> Result<Attribute, StorageError> {
        let attribute = Attribute {
            id: self.next_id()?,
            name: name.to_string(),
            owner_id,
        };
        self.attribute_tree(kind)
            .insert(id_key(attribute.id), encode(&attribute)?)?;
        Ok(attribute)
    }

    /// Attributes owned by `owner_id`, ordered by name descending.
    pub fn list_attributes(
        &self,
        kind: AttributeKind,
        owner_id: UserId,
    ) -> Result<Vec<Attribute>, StorageError> {
        let mut items = vec![];
        for item in self.attribute_tree(kind).iter() {
            let (_, value) = item?;
            let attribute: Attribute = decode(&value)?;
            if attribute.owner_id == owner_id {
                items.push(attribute);
            }
        }
        items.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(items)
    }

    /// Fetch attributes by id in the given order, skipping ids that no
    /// longer exist or belong to someone else.
    pub fn get_attributes(
        &self,
        kind: AttributeKind,
        owner_id: UserId,
        ids: &[u64],
    ) -> Result<Vec<Attribute>, StorageError> {
        let tree = self.attribute_tree(kind);
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = tree.get(id_key(*id))? {
                let attribute: Attribute = decode(&bytes)?;
                if attribute.owner_id == owner_id {
                    items.push(attribute);
                }
            }
        }
        Ok(items)
    }

    /// Ids from `ids` that are not attributes owned by `owner_id`.
    pub fn foreign_attribute_ids(
        &self,
        kind: AttributeKind,
        owner_id: UserId,
        ids: &[u64],
    ) -> Result<Vec<u64>, StorageError> {
        let owned = self.get_attributes(kind, owner_id, ids)?;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| !owned.iter().any(|a| a.id == *id))
            .collect())
    }

    // --- Recipes ---

    /// Create a recipe owned by `owner_id`. `changes` must carry every
    /// required field; missing optional ones fall back to empty values.
    pub fn create_recipe(
        &self,
        owner_id: UserId,
        changes: RecipeChanges,
    ) -> Result<Recipe, StorageError> {
        let mut recipe = Recipe {
            id: self.next_id()?,
            owner_id,
            title: String::new(),
            time_minutes: 0,
            price_cents: 0,
            link: String::new(),
            image: None,
            tags: vec![],
            ingredients: vec![],
        };
        changes.apply(&mut recipe);
        self.recipes.insert(id_key(recipe.id), encode(&recipe)?)?;
        Ok(recipe)
    }

    /// Owner-scoped lookup: a recipe belonging to another user is
    /// indistinguishable from a missing one.
    pub fn get_recipe(&self, owner_id: UserId, id: u64) -> Result<Option<Recipe>, StorageError> {
        let recipe = self
            .recipes
            .get(id_key(id))?
            .map(|bytes| decode::<Recipe>(&bytes))
            .transpose()?;
        Ok(recipe.filter(|r| r.owner_id == owner_id))
    }

    /// Recipes matching `filter`, newest first.
    pub fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, StorageError> {
        let mut recipes = vec![];
        for item in self.recipes.iter().rev() {
            let (_, value) = item?;
            let recipe: Recipe = decode(&value)?;
            if filter.matches(&recipe) {
                recipes.push(recipe);
            }
        }
        Ok(recipes)
    }

    /// Read-modify-write of an owned recipe in a single transaction.
    fn modify_recipe<F>(&self, owner_id: UserId, id: u64, f: F) -> Result<Option<Recipe>, StorageError>
    where
        F: Fn(&mut Recipe),
    {
        let key = id_key(id);
        let result = self.recipes.transaction(
            |tree: &TransactionalTree| -> ConflictableTransactionResult<Option<Recipe>, StorageError> {
                let Some(bytes) = tree.get(&key[..])? else {
                    return Ok(None);
                };
                let mut recipe: Recipe = tx_decode(&bytes)?;
                if recipe.owner_id != owner_id {
                    return Ok(None);
                }
                f(&mut recipe);
                tree.insert(&key[..], tx_encode(&recipe)?)?;
                Ok(Some(recipe))
            },
        )?;
        Ok(result)
    }

    pub fn update_recipe(
        &self,
        owner_id: UserId,
        id: u64,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StorageError> {
        self.modify_recipe(owner_id, id, |recipe| changes.clone().apply(recipe))
    }

    pub fn set_recipe_image(
        &self,
        owner_id: UserId,
        id: u64,
        image: &str,
    ) -> Result<Option<Recipe>, StorageError> {
        self.modify_recipe(owner_id, id, |recipe| recipe.image = Some(image.to_string()))
    }

    /// Returns false when the recipe is missing or not owned.
    pub fn delete_recipe(&self, owner_id: UserId, id: u64) -> Result<bool, StorageError> {
        let key = id_key(id);
        let deleted = self.recipes.transaction(
            |tree: &TransactionalTree| -> ConflictableTransactionResult<bool, StorageError> {
                let Some(bytes) = tree.get(&key[..])? else {
                    return Ok(false);
                };
                let recipe: Recipe = tx_decode(&bytes)?;
                if recipe.owner_id != owner_id {
                    return Ok(false);
                }
                tree.remove(&key[..])?;
                Ok(true)
            },
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe_changes(title: &str, tags: Vec<u64>, ingredients: Vec<u64>) -> RecipeChanges {
        RecipeChanges {
            title: Some(title.to_string()),
            time_minutes: Some(10),
            price_cents: Some(500),
            link: None,
            tags: Some(tags),
            ingredients: Some(ingredients),
        }
    }

    #[test]
    fn test_create_user_rejects_duplicate_email() {
        let storage = Storage::temporary().expect("Failed to open storage");
        let user = storage
            .create_user("a@example.com", "hash", "A", false, false)
            .expect("Create failed");
        assert!(user.is_active);
        assert!(user.id > 0);

        let err = storage
            .create_user("a@example.com", "hash2", "B", false, false)
            .unwrap_err();
        assert!(matches!(err, StorageError::EmailTaken(_)));

        let found = storage.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(found, user);
    }

    #[test]
    fn test_update_user_moves_email_index() {
        let storage = Storage::temporary().unwrap();
        let user = storage.create_user("old@example.com", "h", "Old", false, false).unwrap();
        storage.create_user("taken@example.com", "h", "Other", false, false).unwrap();

        let err = storage
            .update_user(
                user.id,
                UserChanges {
                    email: Some("taken@example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::EmailTaken(_)));

        let updated = storage
            .update_user(
                user.id,
                UserChanges {
                    email: Some("new@example.com".to_string()),
                    name: Some("New".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "New");
        assert!(storage.get_user_by_email("old@example.com").unwrap().is_none());
        assert_eq!(
            storage.get_user_by_email("new@example.com").unwrap().unwrap().id,
            user.id
        );
    }

    #[test]
    fn test_attributes_are_owner_scoped_and_sorted_desc() {
        let storage = Storage::temporary().unwrap();
        storage.create_attribute(AttributeKind::Tag, 1, "Vegan").unwrap();
        storage.create_attribute(AttributeKind::Tag, 1, "Dessert").unwrap();
        storage.create_attribute(AttributeKind::Tag, 2, "Zesty").unwrap();
        storage.create_attribute(AttributeKind::Ingredient, 1, "Salt").unwrap();

        let names: Vec<String> = storage
            .list_attributes(AttributeKind::Tag, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Vegan", "Dessert"]);
    }

    #[test]
    fn test_foreign_attribute_ids_reports_missing_and_unowned() {
        let storage = Storage::temporary().unwrap();
        let mine = storage.create_attribute(AttributeKind::Tag, 1, "Mine").unwrap();
        let theirs = storage.create_attribute(AttributeKind::Tag, 2, "Theirs").unwrap();

        let foreign = storage
            .foreign_attribute_ids(AttributeKind::Tag, 1, &[mine.id, theirs.id, 9999])
            .unwrap();
        assert_eq!(foreign, vec![theirs.id, 9999]);
    }

    #[test]
    fn test_recipe_lookup_update_delete_are_owner_scoped() {
        let storage = Storage::temporary().unwrap();
        let recipe = storage.create_recipe(1, recipe_changes("Soup", vec![], vec![])).unwrap();

        assert!(storage.get_recipe(2, recipe.id).unwrap().is_none());
        assert!(storage
            .update_recipe(2, recipe.id, recipe_changes("Hijack", vec![], vec![]))
            .unwrap()
            .is_none());
        assert!(!storage.delete_recipe(2, recipe.id).unwrap());

        let updated = storage
            .update_recipe(
                1,
                recipe.id,
                RecipeChanges {
                    title: Some("Stew".to_string()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Stew");
        assert_eq!(updated.price_cents, 500);

        assert!(storage.delete_recipe(1, recipe.id).unwrap());
        assert!(storage.get_recipe(1, recipe.id).unwrap().is_none());
    }

    #[test]
    fn test_list_recipes_newest_first() {
        let storage = Storage::temporary().unwrap();
        let first = storage.create_recipe(1, recipe_changes("First", vec![], vec![])).unwrap();
        let second = storage.create_recipe(1, recipe_changes("Second", vec![], vec![])).unwrap();
        storage.create_recipe(2, recipe_changes("Other", vec![], vec![])).unwrap();

        let ids: Vec<u64> = storage
            .list_recipes(&RecipeFilter::for_owner(1))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_set_recipe_image() {
        let storage = Storage::temporary().unwrap();
        let recipe = storage.create_recipe(1, recipe_changes("Soup", vec![], vec![])).unwrap();

        assert!(storage.set_recipe_image(2, recipe.id, "/media/x.png").unwrap().is_none());
        let updated = storage.set_recipe_image(1, recipe.id, "/media/x.png").unwrap().unwrap();
        assert_eq!(updated.image.as_deref(), Some("/media/x.png"));
        assert_eq!(
            storage.get_recipe(1, recipe.id).unwrap().unwrap().image.as_deref(),
            Some("/media/x.png")
        );
    }
}
