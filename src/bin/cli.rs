use clap::{Parser, Subcommand};
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;

const TOKEN_FILE: &str = ".recipe_token";

#[derive(Parser)]
#[command(name = "recipe-cli")]
#[command(about = "CLI for the recipe API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        name: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Me,
    ListTags,
    CreateTag {
        #[arg(short, long)]
        name: String,
    },
    ListIngredients,
    CreateIngredient {
        #[arg(short, long)]
        name: String,
    },
    ListRecipes {
        /// Comma-separated tag ids
        #[arg(short, long)]
        tags: Option<String>,
        /// Comma-separated ingredient ids
        #[arg(short, long)]
        ingredients: Option<String>,
    },
    GetRecipe {
        #[arg(short, long)]
        id: u64,
    },
    CreateRecipe {
        #[arg(short = 'T', long)]
        title: String,
        #[arg(short = 'm', long)]
        time_minutes: i32,
        #[arg(short, long)]
        price: String,
        #[arg(short, long, default_value = "")]
        link: String,
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<u64>,
        #[arg(short, long, value_delimiter = ',')]
        ingredients: Vec<u64>,
    },
    UpdateRecipe {
        #[arg(short, long)]
        id: u64,
        #[arg(short = 'T', long)]
        title: Option<String>,
        #[arg(short = 'm', long)]
        time_minutes: Option<i32>,
        #[arg(short, long)]
        price: Option<String>,
        #[arg(short, long)]
        link: Option<String>,
        #[arg(short, long, value_delimiter = ',')]
        tags: Option<Vec<u64>>,
        #[arg(short = 'g', long, value_delimiter = ',')]
        ingredients: Option<Vec<u64>>,
    },
    DeleteRecipe {
        #[arg(short, long)]
        id: u64,
    },
    UploadImage {
        #[arg(short, long)]
        id: u64,
        #[arg(short, long)]
        file: String,
    },
    Logout,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

fn authorized(request: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    request.header("Authorization", format!("Bearer {}", token.trim()))
}

async fn print_response(request: RequestBuilder) -> Result<(), Box<dyn std::error::Error>> {
    let res = authorized(request).send().await?;
    println!("{}: {}", res.status(), res.text().await?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api", cli.url.trim_end_matches('/'));

    match cli.command {
        Commands::Register { email, password, name } => {
            let res = client
                .post(format!("{api}/users/"))
                .json(&json!({ "email": email, "password": password, "name": name }))
                .send()
                .await?;
            println!("{}: {}", res.status(), res.text().await?);
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{api}/users/token/"))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: TokenResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Me => print_response(client.get(format!("{api}/users/me/"))).await?,
        Commands::ListTags => print_response(client.get(format!("{api}/recipe/tags/"))).await?,
        Commands::CreateTag { name } => {
            print_response(client.post(format!("{api}/recipe/tags/")).json(&json!({ "name": name }))).await?
        }
        Commands::ListIngredients => {
            print_response(client.get(format!("{api}/recipe/ingredients/"))).await?
        }
        Commands::CreateIngredient { name } => {
            print_response(
                client
                    .post(format!("{api}/recipe/ingredients/"))
                    .json(&json!({ "name": name })),
            )
            .await?
        }
        Commands::ListRecipes { tags, ingredients } => {
            let mut query = vec![];
            if let Some(tags) = tags {
                query.push(("tags", tags));
            }
            if let Some(ingredients) = ingredients {
                query.push(("ingredients", ingredients));
            }
            print_response(client.get(format!("{api}/recipe/recipes/")).query(&query)).await?
        }
        Commands::GetRecipe { id } => {
            print_response(client.get(format!("{api}/recipe/recipes/{id}/"))).await?
        }
        Commands::CreateRecipe { title, time_minutes, price, link, tags, ingredients } => {
            let body = json!({
                "title": title,
                "time_minutes": time_minutes,
                "price": price,
                "link": link,
                "tags": tags,
                "ingredients": ingredients,
            });
            print_response(client.post(format!("{api}/recipe/recipes/")).json(&body)).await?
        }
        Commands::UpdateRecipe { id, title, time_minutes, price, link, tags, ingredients } => {
            let mut body = Map::new();
            if let Some(title) = title {
                body.insert("title".into(), json!(title));
            }
            if let Some(time_minutes) = time_minutes {
                body.insert("time_minutes".into(), json!(time_minutes));
            }
            if let Some(price) = price {
                body.insert("price".into(), json!(price));
            }
            if let Some(link) = link {
                body.insert("link".into(), json!(link));
            }
            if let Some(tags) = tags {
                body.insert("tags".into(), json!(tags));
            }
            if let Some(ingredients) = ingredients {
                body.insert("ingredients".into(), json!(ingredients));
            }
            print_response(
                client
                    .patch(format!("{api}/recipe/recipes/{id}/"))
                    .json(&Value::Object(body)),
            )
            .await?
        }
        Commands::DeleteRecipe { id } => {
            print_response(client.delete(format!("{api}/recipe/recipes/{id}/"))).await?
        }
        Commands::UploadImage { id, file } => {
            let bytes = fs::read(&file)?;
            let file_name = std::path::Path::new(&file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let form = multipart::Form::new()
                .part("image", multipart::Part::bytes(bytes).file_name(file_name));
            print_response(
                client
                    .post(format!("{api}/recipe/recipes/{id}/upload-image/"))
                    .multipart(form),
            )
            .await?
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
    }

    Ok(())
}
