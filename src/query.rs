//! Recipe list filtering
//!
//! Turns the `tags` / `ingredients` query parameters into a typed
//! [`RecipeFilter`]. Each parameter is a comma-separated list of ids;
//! a recipe matches a parameter when it references any of the listed ids,
//! and both parameters must match when both are given. Ownership is always
//! checked last, whatever filters are active.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Recipe, UserId};

/// Raw query string of the recipe list endpoint.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RecipeListParams {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid id {token:?} in `{param}`")]
pub struct MalformedFilterError {
    pub param: &'static str,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub owner_id: UserId,
    pub tags: Option<Vec<u64>>,
    pub ingredients: Option<Vec<u64>>,
}

/// A base-10 integer read from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdToken {
    Id(u64),
    /// Negative or past `u64::MAX`: a valid integer no record can have.
    OutOfRange,
}

/// `None` when the token is not an integer at all.
pub fn parse_id_token(token: &str) -> Option<IdToken> {
    let token = token.trim();
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative && digits.bytes().any(|b| b != b'0') {
        return Some(IdToken::OutOfRange);
    }
    Some(digits.parse().map_or(IdToken::OutOfRange, IdToken::Id))
}

/// Parse `"1,2,3"` into ids. An absent or empty parameter means no filter.
/// Integers that cannot be ids are dropped, so they match nothing.
pub fn parse_id_list(
    param: &'static str,
    raw: Option<&str>,
) -> Result<Option<Vec<u64>>, MalformedFilterError> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let mut ids = vec![];
    for token in raw.split(',') {
        match parse_id_token(token) {
            Some(IdToken::Id(id)) => ids.push(id),
            Some(IdToken::OutOfRange) => {}
            None => {
                return Err(MalformedFilterError {
                    param,
                    token: token.to_string(),
                })
            }
        }
    }
    Ok(Some(ids))
}

impl RecipeFilter {
    pub fn for_owner(owner_id: UserId) -> Self {
        Self {
            owner_id,
            tags: None,
            ingredients: None,
        }
    }

    pub fn from_params(owner_id: UserId, params: &RecipeListParams) -> Result<Self, MalformedFilterError> {
        Ok(Self {
            owner_id,
            tags: parse_id_list("tags", params.tags.as_deref())?,
            ingredients: parse_id_list("ingredients", params.ingredients.as_deref())?,
        })
    }

    pub fn matches(&self, recipe: &Recipe) -> bool {
        intersects(self.tags.as_deref(), &recipe.tags)
            && intersects(self.ingredients.as_deref(), &recipe.ingredients)
            && recipe.owner_id == self.owner_id
    }
}

fn intersects(wanted: Option<&[u64]>, have: &[u64]) -> bool {
    match wanted {
        Some(wanted) => have.iter().any(|id| wanted.contains(id)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(owner_id: UserId, tags: Vec<u64>, ingredients: Vec<u64>) -> Recipe {
        Recipe {
            id: 1,
            owner_id,
            title: "Test".to_string(),
            time_minutes: 5,
            price_cents: 100,
            link: String::new(),
            image: None,
            tags,
            ingredients,
        }
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("tags", None), Ok(None));
        assert_eq!(parse_id_list("tags", Some("")), Ok(None));
        assert_eq!(parse_id_list("tags", Some("1,2, 3")), Ok(Some(vec![1, 2, 3])));

        let err = parse_id_list("tags", Some("1,abc")).unwrap_err();
        assert_eq!(err.param, "tags");
        assert_eq!(err.token, "abc");
        assert!(parse_id_list("ingredients", Some("1,,2")).is_err());
        assert!(parse_id_list("ingredients", Some("1.5")).is_err());
    }

    #[test]
    fn test_unrepresentable_integers_match_nothing() {
        assert_eq!(parse_id_list("tags", Some("-1")), Ok(Some(vec![])));
        assert_eq!(
            parse_id_list("tags", Some("18446744073709551616")),
            Ok(Some(vec![]))
        );
        assert_eq!(parse_id_list("tags", Some("4,-2,+5")), Ok(Some(vec![4, 5])));

        assert_eq!(parse_id_token("-0"), Some(IdToken::Id(0)));
        assert_eq!(parse_id_token(" 007 "), Some(IdToken::Id(7)));
        assert_eq!(parse_id_token("-"), None);

        let params = RecipeListParams {
            tags: Some("-1".to_string()),
            ingredients: None,
        };
        let filter = RecipeFilter::from_params(7, &params).unwrap();
        assert!(!filter.matches(&recipe(7, vec![1], vec![])));
    }

    #[test]
    fn test_tag_filter_is_any_of() {
        let params = RecipeListParams {
            tags: Some("1,2".to_string()),
            ingredients: None,
        };
        let filter = RecipeFilter::from_params(7, &params).unwrap();

        assert!(filter.matches(&recipe(7, vec![2, 5], vec![])));
        assert!(filter.matches(&recipe(7, vec![1], vec![])));
        assert!(!filter.matches(&recipe(7, vec![3], vec![])));
        assert!(!filter.matches(&recipe(7, vec![], vec![])));
    }

    #[test]
    fn test_tag_and_ingredient_filters_combine() {
        let params = RecipeListParams {
            tags: Some("1".to_string()),
            ingredients: Some("9".to_string()),
        };
        let filter = RecipeFilter::from_params(7, &params).unwrap();

        assert!(filter.matches(&recipe(7, vec![1], vec![9])));
        assert!(!filter.matches(&recipe(7, vec![1], vec![8])));
        assert!(!filter.matches(&recipe(7, vec![2], vec![9])));
    }

    #[test]
    fn test_owner_always_checked() {
        let unfiltered = RecipeFilter::for_owner(7);
        assert!(unfiltered.matches(&recipe(7, vec![], vec![])));
        assert!(!unfiltered.matches(&recipe(8, vec![], vec![])));

        let params = RecipeListParams {
            tags: Some("1".to_string()),
            ingredients: None,
        };
        let filter = RecipeFilter::from_params(7, &params).unwrap();
        assert!(!filter.matches(&recipe(8, vec![1], vec![])));
    }

    #[test]
    fn test_malformed_param_names_the_parameter() {
        let params = RecipeListParams {
            tags: None,
            ingredients: Some("x".to_string()),
        };
        let err = RecipeFilter::from_params(7, &params).unwrap_err();
        assert_eq!(err.param, "ingredients");
    }
}
