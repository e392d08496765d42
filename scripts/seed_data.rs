//! Seed script for the recipe API
//!
//! Populates the Sled store with a demo account and a handful of tags,
//! ingredients and recipes so the API has something to list.
//! Run: cargo run --bin seed_data
//! Log in afterwards as demo@example.com / demo-pass-123.

use recipe_api::auth::hash_password;
use recipe_api::config::Config;
use recipe_api::models::RecipeChanges;
use recipe_api::storage::{AttributeKind, Storage};

const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo-pass-123";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let storage = Storage::open(&config.data_dir)?;

    if storage.get_user_by_email(DEMO_EMAIL)?.is_some() {
        println!("Demo user {DEMO_EMAIL} already exists, nothing to do.");
        return Ok(());
    }

    let user = storage.create_user(
        DEMO_EMAIL,
        &hash_password(DEMO_PASSWORD)?,
        "Demo Cook",
        false,
        false,
    )?;

    let mut tag_ids = vec![];
    for name in ["Vegan", "Dessert", "Dinner", "Quick"] {
        tag_ids.push(storage.create_attribute(AttributeKind::Tag, user.id, name)?.id);
    }
    let mut ingredient_ids = vec![];
    for name in ["Flour", "Sugar", "Tofu", "Garlic", "Rice", "Cocoa"] {
        ingredient_ids.push(
            storage
                .create_attribute(AttributeKind::Ingredient, user.id, name)?
                .id,
        );
    }

    // (title, minutes, cents, tag indexes, ingredient indexes)
    let recipes: [(&str, i32, i64, &[usize], &[usize]); 4] = [
        ("Garlic Tofu Stir Fry", 20, 850, &[0, 2, 3], &[2, 3, 4]),
        ("Chocolate Brownies", 45, 600, &[1], &[0, 1, 5]),
        ("Fried Rice", 15, 400, &[2, 3], &[3, 4]),
        ("Sugar Cookies", 30, 325, &[1], &[0, 1]),
    ];

    for (title, time_minutes, price_cents, tags, ingredients) in recipes {
        let changes = RecipeChanges {
            title: Some(title.to_string()),
            time_minutes: Some(time_minutes),
            price_cents: Some(price_cents),
            link: Some(String::new()),
            tags: Some(tags.iter().map(|i| tag_ids[*i]).collect()),
            ingredients: Some(ingredients.iter().map(|i| ingredient_ids[*i]).collect()),
        };
        let recipe = storage.create_recipe(user.id, changes)?;
        println!("Created recipe {} ({})", recipe.id, recipe.title);
    }

    storage.flush().await?;
    println!(
        "Seeded {} tags, {} ingredients and {} recipes for {DEMO_EMAIL}",
        tag_ids.len(),
        ingredient_ids.len(),
        recipes.len()
    );
    Ok(())
}
