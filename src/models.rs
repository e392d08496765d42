use serde::{Deserialize, Serialize};

pub type UserId = u64;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Shared shape of the user-owned recipe attributes (tags and ingredients).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attribute {
    pub id: u64,
    pub name: String,
    pub owner_id: UserId,
}

pub type Tag = Attribute;
pub type Ingredient = Attribute;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: u64,
    pub owner_id: UserId,
    pub title: String,
    pub time_minutes: i32,
    pub price_cents: i64,
    pub link: String,
    pub image: Option<String>,
    pub tags: Vec<u64>,
    pub ingredients: Vec<u64>,
}

/// Writable recipe fields after validation; the owner and id are
/// never taken from a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price_cents: Option<i64>,
    pub link: Option<String>,
    pub tags: Option<Vec<u64>>,
    pub ingredients: Option<Vec<u64>>,
}

impl RecipeChanges {
    pub fn apply(self, recipe: &mut Recipe) {
        if let Some(title) = self.title {
            recipe.title = title;
        }
        if let Some(time_minutes) = self.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(price_cents) = self.price_cents {
            recipe.price_cents = price_cents;
        }
        if let Some(link) = self.link {
            recipe.link = link;
        }
        if let Some(tags) = self.tags {
            recipe.tags = dedup_ids(tags);
        }
        if let Some(ingredients) = self.ingredients {
            recipe.ingredients = dedup_ids(ingredients);
        }
    }
}

/// Relation lists are sets; keep first occurrence order.
pub fn dedup_ids(ids: Vec<u64>) -> Vec<u64> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Fields changed by a profile update.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // user id
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes_keeps_untouched_fields() {
        let mut recipe = Recipe {
            id: 1,
            owner_id: 7,
            title: "Soup".to_string(),
            time_minutes: 10,
            price_cents: 500,
            link: String::new(),
            image: None,
            tags: vec![1],
            ingredients: vec![2],
        };
        RecipeChanges {
            title: Some("Stew".to_string()),
            tags: Some(vec![3, 3, 4]),
            ..Default::default()
        }
        .apply(&mut recipe);

        assert_eq!(recipe.title, "Stew");
        assert_eq!(recipe.tags, vec![3, 4]);
        assert_eq!(recipe.ingredients, vec![2]);
        assert_eq!(recipe.price_cents, 500);
        assert_eq!(recipe.owner_id, 7);
    }
}
