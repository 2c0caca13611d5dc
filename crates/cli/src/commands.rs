//! CLI commands

use almoner_http::{AlmonerClient, ClientConfig, Credentials, MultipartForm};
use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and persist the session
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "ALMONER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the persisted session
    Logout,

    /// Show whether a session is stored
    Status,

    /// Exchange the refresh token for a new access token
    Refresh,

    /// Print the effective client configuration
    Config,

    /// GET a resource, e.g. `almoner get /donations/ -q page=1 -q page_size=10`
    Get {
        path: String,

        /// Query parameter as key=value; repeat a key to send a list
        #[arg(short = 'q', long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// POST a JSON body
    Post {
        path: String,

        /// JSON body
        #[arg(long)]
        data: String,
    },

    /// PUT a JSON body
    Put {
        path: String,

        /// JSON body
        #[arg(long)]
        data: String,
    },

    /// PATCH a JSON body
    Patch {
        path: String,

        /// JSON body
        #[arg(long)]
        data: String,
    },

    /// DELETE a resource
    Delete { path: String },

    /// Send a multipart form, e.g. an image for a news article or gallery item
    Upload {
        path: String,

        /// Text field as key=value
        #[arg(long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,

        /// File field as key=path
        #[arg(long = "file", value_parser = parse_key_val)]
        files: Vec<(String, String)>,

        /// Use PATCH instead of POST
        #[arg(long)]
        patch: bool,
    },
}

impl Commands {
    pub async fn execute(self, config: &ClientConfig) -> Result<()> {
        if let Self::Config = self {
            return print_json(&serde_json::to_value(config)?);
        }

        let client = AlmonerClient::builder()
            .config(config)
            .on_session_expired(|_login_route: &str| {
                error!("Session expired, run `almoner login` to sign in again");
            })
            .build()?;

        match self {
            Self::Login { email, password } => {
                client.login(&Credentials::new(email, password)).await?;
                info!("Session stored");
                println!("Logged in");
                Ok(())
            }
            Self::Logout => {
                client.logout();
                println!("Logged out");
                Ok(())
            }
            Self::Status => {
                let session = client.session();
                print_json(&serde_json::json!({
                    "base_url": client.base_url(),
                    "authenticated": session.access_token.is_some(),
                    "refresh_token_stored": session.refresh_token.is_some(),
                }))
            }
            Self::Refresh => {
                client.refresh().await?;
                println!("Session refreshed");
                Ok(())
            }
            Self::Get { path, params } => {
                let value: Value = client.get(&path, &params_to_json(params)).await?;
                print_json(&value)
            }
            Self::Post { path, data } => {
                let value: Value = client.post(&path, &parse_body(&data)?).await?;
                print_json(&value)
            }
            Self::Put { path, data } => {
                let value: Value = client.put(&path, &parse_body(&data)?).await?;
                print_json(&value)
            }
            Self::Patch { path, data } => {
                let value: Value = client.patch(&path, &parse_body(&data)?).await?;
                print_json(&value)
            }
            Self::Delete { path } => {
                let value: Value = client.delete(&path).await?;
                if !value.is_null() {
                    print_json(&value)?;
                }
                Ok(())
            }
            Self::Upload {
                path,
                fields,
                files,
                patch,
            } => {
                let form = build_form(fields, files)?;
                let value: Value = if patch {
                    client.patch_multipart(&path, form).await?
                } else {
                    client.post_multipart(&path, form).await?
                };
                print_json(&value)
            }
            Self::Config => Ok(()),
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn parse_body(data: &str) -> Result<Value> {
    serde_json::from_str(data).context("--data must be valid JSON")
}

/// Group repeated keys into lists so they are sent as repeated parameters
fn params_to_json(params: Vec<(String, String)>) -> Value {
    let mut map = Map::new();
    for (key, value) in params {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(map)
}

fn build_form(fields: Vec<(String, String)>, files: Vec<(String, String)>) -> Result<MultipartForm> {
    if fields.is_empty() && files.is_empty() {
        bail!("upload needs at least one --field or --file");
    }

    let mut form = MultipartForm::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for (name, path) in files {
        let path = PathBuf::from(path);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?
            .to_string();
        let content_type = content_type_for(&file_name);
        form = form.file(name, file_name, content_type, bytes);
    }
    Ok(form)
}

fn content_type_for(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
