//! Wire representations and request validation.
//!
//! Request bodies deserialize into all-optional payload structs, then
//! `validate` turns them into model changes or a field-level error map.
//! Recipe responses come in three shapes picked by [`RecipeAction::view`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{OpenApi, ToSchema};

use crate::auth::normalize_email;
use crate::models::{Attribute, Recipe, RecipeChanges, User};
use crate::query::{parse_id_token, IdToken};
use crate::storage::{AttributeKind, Storage, StorageError};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

const MAX_CHARS: usize = 255;
const MIN_PASSWORD_CHARS: usize = 5;
const PRICE_MAX_DIGITS: usize = 5;
const PRICE_DECIMAL_PLACES: usize = 2;

pub const REQUIRED: &str = "This field is required.";

pub fn field_error(field: &str, message: impl Into<String>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), vec![message.into()]);
    errors
}

fn push(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(message.into());
}

/// Required-or-optional check plus blank and length rules for char fields.
fn check_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    required: bool,
    allow_blank: bool,
) -> Option<String> {
    let Some(value) = value else {
        if required {
            push(errors, field, REQUIRED);
        }
        return None;
    };
    let trimmed = value.trim();
    if trimmed.is_empty() && !allow_blank {
        push(errors, field, "This field may not be blank.");
        return None;
    }
    if trimmed.chars().count() > MAX_CHARS {
        push(
            errors,
            field,
            format!("Ensure this field has no more than {MAX_CHARS} characters."),
        );
        return None;
    }
    Some(trimmed.to_string())
}

fn finish<T>(errors: FieldErrors, value: T) -> Result<T, FieldErrors> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

// --- Users ---

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct UserPayload {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Validated user fields; the password is still plain text.
#[derive(Debug, Default, PartialEq)]
pub struct UserInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl UserPayload {
    /// `partial` is PATCH semantics: absent fields are left alone.
    pub fn validate(self, partial: bool) -> Result<UserInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let required = !partial;

        let email = check_text(&mut errors, "email", self.email.as_deref(), required, false)
            .and_then(|email| {
                if looks_like_email(&email) {
                    Some(normalize_email(&email))
                } else {
                    push(&mut errors, "email", "Enter a valid email address.");
                    None
                }
            });

        let password = match self.password {
            None if required => {
                push(&mut errors, "password", REQUIRED);
                None
            }
            None => None,
            Some(p) if p.chars().count() < MIN_PASSWORD_CHARS => {
                push(
                    &mut errors,
                    "password",
                    format!("Ensure this field has at least {MIN_PASSWORD_CHARS} characters."),
                );
                None
            }
            Some(p) => Some(p),
        };

        let name = check_text(&mut errors, "name", self.name.as_deref(), required, false);

        finish(errors, UserInput { email, password, name })
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct TokenPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl TokenPayload {
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = check_text(&mut errors, "email", self.email.as_deref(), true, false);
        // Passwords are not trimmed.
        let password = match self.password {
            Some(p) if !p.is_empty() => Some(p),
            Some(_) => {
                push(&mut errors, "password", "This field may not be blank.");
                None
            }
            None => {
                push(&mut errors, "password", REQUIRED);
                None
            }
        };
        match (email, password) {
            (Some(email), Some(password)) if errors.is_empty() => {
                Ok((normalize_email(&email), password))
            }
            _ => Err(errors),
        }
    }
}

#[derive(Serialize, Debug, PartialEq, ToSchema)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

// --- Tags / ingredients ---

#[derive(Deserialize, Debug, ToSchema)]
pub struct AttributePayload {
    pub name: Option<String>,
}

impl AttributePayload {
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = check_text(&mut errors, "name", self.name.as_deref(), true, false);
        match name {
            Some(name) if errors.is_empty() => Ok(name),
            _ => Err(errors),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct AttributeResponse {
    pub id: u64,
    pub name: String,
}

impl From<&Attribute> for AttributeResponse {
    fn from(attribute: &Attribute) -> Self {
        Self {
            id: attribute.id,
            name: attribute.name.clone(),
        }
    }
}

// --- Recipes ---

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct RecipePayload {
    pub title: Option<String>,
    #[schema(value_type = Option<i32>)]
    pub time_minutes: Option<Value>,
    /// Decimal as a string ("5.00") or a JSON number.
    #[schema(value_type = Option<String>)]
    pub price: Option<Value>,
    pub link: Option<String>,
    /// Primary keys as JSON integers or numeric strings.
    #[schema(value_type = Option<Vec<u64>>)]
    pub tags: Option<Value>,
    #[schema(value_type = Option<Vec<u64>>)]
    pub ingredients: Option<Value>,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn does_not_exist(pk: impl std::fmt::Display) -> String {
    format!("Invalid pk \"{pk}\" - object does not exist.")
}

fn parse_pk(item: &Value) -> Result<u64, String> {
    let incorrect_type =
        || format!("Incorrect type. Expected pk value, received {}.", json_type_name(item));
    match item {
        Value::Null => Err("This field may not be null.".to_string()),
        Value::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(id), _, _) => Ok(id),
            (None, Some(negative), _) => Err(does_not_exist(negative)),
            (None, None, Some(f)) if f.fract() == 0.0 => Err(does_not_exist(n)),
            _ => Err(incorrect_type()),
        },
        Value::String(s) => match parse_id_token(s) {
            Some(IdToken::Id(id)) => Ok(id),
            Some(IdToken::OutOfRange) => Err(does_not_exist(s)),
            None => Err(incorrect_type()),
        },
        _ => Err(incorrect_type()),
    }
}

/// A many-to-many field: a list of primary keys. Stops at the first bad item.
fn parse_pk_list(value: &Value) -> Result<Vec<u64>, String> {
    let Value::Array(items) = value else {
        return Err(format!(
            "Expected a list of items but got type \"{}\".",
            json_type_name(value)
        ));
    };
    items.iter().map(parse_pk).collect()
}

fn check_relation(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&Value>,
    required: bool,
) -> Option<Vec<u64>> {
    match value {
        Some(value) => parse_pk_list(value).map_err(|msg| push(errors, field, msg)).ok(),
        None => {
            if required {
                push(errors, field, REQUIRED);
            }
            None
        }
    }
}

fn parse_time_minutes(value: &Value) -> Result<i32, String> {
    let invalid = || "A valid integer is required.".to_string();
    let number = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => f as i64,
                _ => return Err(invalid()),
            },
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    i32::try_from(number).map_err(|_| {
        if number > 0 {
            format!("Ensure this value is less than or equal to {}.", i32::MAX)
        } else {
            format!("Ensure this value is greater than or equal to {}.", i32::MIN)
        }
    })
}

/// Parse a decimal with at most 5 digits, 2 of them after the point,
/// into cents.
pub fn parse_price(value: &Value) -> Result<i64, String> {
    let invalid = || "A valid number is required.".to_string();
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid()),
    };

    let (negative, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw.as_str())),
    };
    let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(invalid());
    }

    let whole = whole.trim_start_matches('0');
    if whole.len() + frac.len() > PRICE_MAX_DIGITS {
        return Err(format!(
            "Ensure that there are no more than {PRICE_MAX_DIGITS} digits in total."
        ));
    }
    if frac.len() > PRICE_DECIMAL_PLACES {
        return Err(format!(
            "Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."
        ));
    }
    let max_whole = PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES;
    if whole.len() > max_whole {
        return Err(format!(
            "Ensure that there are no more than {max_whole} digits before the decimal point."
        ));
    }

    let whole_value: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac_value: i64 = format!("{frac:0<2}").parse().map_err(|_| invalid())?;
    let cents = whole_value * 100 + frac_value;
    Ok(if negative { -cents } else { cents })
}

pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

impl RecipePayload {
    /// Field validation only; relation ownership is checked against
    /// storage by [`check_relations`].
    pub fn validate(self, partial: bool) -> Result<RecipeChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        let required = !partial;

        let title = check_text(&mut errors, "title", self.title.as_deref(), required, false);
        let link = check_text(&mut errors, "link", self.link.as_deref(), false, true);

        let time_minutes = match &self.time_minutes {
            Some(value) => parse_time_minutes(value)
                .map_err(|msg| push(&mut errors, "time_minutes", msg))
                .ok(),
            None => {
                if required {
                    push(&mut errors, "time_minutes", REQUIRED);
                }
                None
            }
        };
        let price_cents = match &self.price {
            Some(value) => parse_price(value).map_err(|msg| push(&mut errors, "price", msg)).ok(),
            None => {
                if required {
                    push(&mut errors, "price", REQUIRED);
                }
                None
            }
        };
        let tags = check_relation(&mut errors, "tags", self.tags.as_ref(), required);
        let ingredients =
            check_relation(&mut errors, "ingredients", self.ingredients.as_ref(), required);

        finish(
            errors,
            RecipeChanges {
                title,
                time_minutes,
                price_cents,
                link,
                tags,
                ingredients,
            },
        )
    }
}

/// Every referenced tag and ingredient must exist and belong to `owner_id`.
/// Missing and foreign ids get the same message.
pub fn check_relations(
    storage: &Storage,
    owner_id: u64,
    changes: &RecipeChanges,
) -> Result<Result<(), FieldErrors>, StorageError> {
    let mut errors = FieldErrors::new();
    let relations = [
        ("tags", AttributeKind::Tag, &changes.tags),
        ("ingredients", AttributeKind::Ingredient, &changes.ingredients),
    ];
    for (field, kind, ids) in relations {
        let Some(ids) = ids else { continue };
        for id in storage.foreign_attribute_ids(kind, owner_id, ids)? {
            push(&mut errors, field, does_not_exist(id));
        }
    }
    Ok(finish(errors, ()))
}

/// Actions on the recipe resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeAction {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
    UploadImage,
}

/// Response shape of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeView {
    /// Tags and ingredients as id lists.
    Base,
    /// Tags and ingredients expanded to objects, plus the image.
    Detail,
    ImageOnly,
}

impl RecipeAction {
    pub fn view(self) -> RecipeView {
        match self {
            RecipeAction::Retrieve => RecipeView::Detail,
            RecipeAction::UploadImage => RecipeView::ImageOnly,
            RecipeAction::List
            | RecipeAction::Create
            | RecipeAction::Update
            | RecipeAction::PartialUpdate
            | RecipeAction::Destroy => RecipeView::Base,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct RecipeResponse {
    pub id: u64,
    pub title: String,
    pub ingredients: Vec<u64>,
    pub tags: Vec<u64>,
    pub time_minutes: i32,
    pub price: String,
    pub link: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct RecipeDetailResponse {
    pub id: u64,
    pub title: String,
    pub ingredients: Vec<AttributeResponse>,
    pub tags: Vec<AttributeResponse>,
    pub time_minutes: i32,
    pub price: String,
    pub link: String,
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct RecipeImageResponse {
    pub id: u64,
    pub image: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RecipeBody {
    Base(RecipeResponse),
    Detail(RecipeDetailResponse),
    ImageOnly(RecipeImageResponse),
}

pub fn encode_base(recipe: Recipe) -> RecipeResponse {
    RecipeResponse {
        id: recipe.id,
        title: recipe.title,
        ingredients: recipe.ingredients,
        tags: recipe.tags,
        time_minutes: recipe.time_minutes,
        price: format_price(recipe.price_cents),
        link: recipe.link,
    }
}

pub fn encode_detail(storage: &Storage, recipe: Recipe) -> Result<RecipeDetailResponse, StorageError> {
    let expand = |kind, ids: &[u64]| -> Result<Vec<AttributeResponse>, StorageError> {
        Ok(storage
            .get_attributes(kind, recipe.owner_id, ids)?
            .iter()
            .map(AttributeResponse::from)
            .collect())
    };
    Ok(RecipeDetailResponse {
        id: recipe.id,
        ingredients: expand(AttributeKind::Ingredient, &recipe.ingredients)?,
        tags: expand(AttributeKind::Tag, &recipe.tags)?,
        title: recipe.title,
        time_minutes: recipe.time_minutes,
        price: format_price(recipe.price_cents),
        link: recipe.link,
        image: recipe.image,
    })
}

pub fn encode_image(recipe: Recipe) -> RecipeImageResponse {
    RecipeImageResponse {
        id: recipe.id,
        image: recipe.image,
    }
}

pub fn encode_recipe(
    storage: &Storage,
    view: RecipeView,
    recipe: Recipe,
) -> Result<RecipeBody, StorageError> {
    Ok(match view {
        RecipeView::Base => RecipeBody::Base(encode_base(recipe)),
        RecipeView::Detail => RecipeBody::Detail(encode_detail(storage, recipe)?),
        RecipeView::ImageOnly => RecipeBody::ImageOnly(encode_image(recipe)),
    })
}

#[derive(OpenApi)]
#[openapi(components(schemas(
    UserPayload,
    UserResponse,
    TokenPayload,
    TokenResponse,
    AttributePayload,
    AttributeResponse,
    RecipePayload,
    RecipeResponse,
    RecipeDetailResponse,
    RecipeImageResponse
)))]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_view_selection() {
        assert_eq!(RecipeAction::Retrieve.view(), RecipeView::Detail);
        assert_eq!(RecipeAction::UploadImage.view(), RecipeView::ImageOnly);
        for action in [
            RecipeAction::List,
            RecipeAction::Create,
            RecipeAction::Update,
            RecipeAction::PartialUpdate,
            RecipeAction::Destroy,
        ] {
            assert_eq!(action.view(), RecipeView::Base);
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(&json!("5.00")), Ok(500));
        assert_eq!(parse_price(&json!("5.5")), Ok(550));
        assert_eq!(parse_price(&json!(12)), Ok(1200));
        assert_eq!(parse_price(&json!(0.75)), Ok(75));
        assert_eq!(parse_price(&json!("999.99")), Ok(99999));
        assert_eq!(parse_price(&json!("-1.25")), Ok(-125));
        assert!(parse_price(&json!("1000.00")).unwrap_err().contains("digits in total"));
        assert!(parse_price(&json!("1.234")).unwrap_err().contains("decimal places"));
        assert!(parse_price(&json!("1000")).unwrap_err().contains("before the decimal point"));
        assert!(parse_price(&json!("abc")).is_err());
        assert!(parse_price(&json!(".")).is_err());
        assert!(parse_price(&json!(true)).is_err());
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(500), "5.00");
        assert_eq!(format_price(5), "0.05");
        assert_eq!(format_price(-125), "-1.25");
    }

    #[test]
    fn test_recipe_payload_requires_fields_unless_partial() {
        let errors = RecipePayload::default().validate(false).unwrap_err();
        for field in ["title", "time_minutes", "price", "tags", "ingredients"] {
            assert_eq!(errors[field], vec![REQUIRED.to_string()], "{field}");
        }
        assert!(!errors.contains_key("link"));

        let changes = RecipePayload::default().validate(true).unwrap();
        assert_eq!(changes, RecipeChanges::default());
    }

    #[test]
    fn test_recipe_payload_field_errors() {
        let payload = RecipePayload {
            title: Some("  ".to_string()),
            time_minutes: Some(json!("ten")),
            price: Some(json!("1.999")),
            ..Default::default()
        };
        let errors = payload.validate(true).unwrap_err();
        assert!(errors.contains_key("title"));
        assert!(errors.contains_key("time_minutes"));
        assert!(errors.contains_key("price"));
    }

    #[test]
    fn test_relation_ids_accept_numeric_strings() {
        let changes = RecipePayload {
            tags: Some(json!([1, "2", " 3 "])),
            ingredients: Some(json!([])),
            ..Default::default()
        }
        .validate(true)
        .unwrap();
        assert_eq!(changes.tags, Some(vec![1, 2, 3]));
        assert_eq!(changes.ingredients, Some(vec![]));
    }

    #[test]
    fn test_relation_errors_are_keyed_by_field() {
        let errors = RecipePayload {
            tags: Some(json!(["abc"])),
            ingredients: Some(json!("1")),
            ..Default::default()
        }
        .validate(true)
        .unwrap_err();
        assert_eq!(
            errors["tags"],
            vec!["Incorrect type. Expected pk value, received str.".to_string()]
        );
        assert_eq!(
            errors["ingredients"],
            vec!["Expected a list of items but got type \"str\".".to_string()]
        );

        let errors = RecipePayload {
            tags: Some(json!([-1])),
            ingredients: Some(json!([true])),
            ..Default::default()
        }
        .validate(true)
        .unwrap_err();
        assert_eq!(errors["tags"], vec![does_not_exist(-1)]);
        assert!(errors["ingredients"][0].contains("received bool"));
    }

    #[test]
    fn test_user_payload_validation() {
        let input = UserPayload {
            email: Some("Chef@EXAMPLE.com".to_string()),
            password: Some("secret".to_string()),
            name: Some("Chef".to_string()),
        }
        .validate(false)
        .unwrap();
        assert_eq!(input.email.as_deref(), Some("Chef@example.com"));

        let errors = UserPayload {
            email: Some("not-an-email".to_string()),
            password: Some("pw".to_string()),
            name: None,
        }
        .validate(false)
        .unwrap_err();
        assert_eq!(errors["email"], vec!["Enter a valid email address.".to_string()]);
        assert!(errors["password"][0].contains("at least 5"));
        assert_eq!(errors["name"], vec![REQUIRED.to_string()]);
    }

    #[test]
    fn test_encode_detail_expands_relations() {
        let storage = Storage::temporary().unwrap();
        let tag = storage.create_attribute(AttributeKind::Tag, 1, "Vegan").unwrap();
        let ingredient = storage
            .create_attribute(AttributeKind::Ingredient, 1, "Kale")
            .unwrap();
        let recipe = storage
            .create_recipe(
                1,
                RecipeChanges {
                    title: Some("Salad".to_string()),
                    time_minutes: Some(5),
                    price_cents: Some(300),
                    link: None,
                    tags: Some(vec![tag.id]),
                    ingredients: Some(vec![ingredient.id]),
                },
            )
            .unwrap();

        let body = encode_recipe(&storage, RecipeAction::Retrieve.view(), recipe.clone()).unwrap();
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["tags"], json!([{"id": tag.id, "name": "Vegan"}]));
        assert_eq!(value["ingredients"], json!([{"id": ingredient.id, "name": "Kale"}]));
        assert_eq!(value["price"], json!("3.00"));

        let body = encode_recipe(&storage, RecipeAction::List.view(), recipe).unwrap();
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["tags"], json!([tag.id]));
        assert!(value.get("image").is_none());
    }
}
