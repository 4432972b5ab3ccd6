use clap::Subcommand;
use calorie_minder_core::Config;

const TOKEN_KEY: &str = "activity.access_token";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "scale.quiet_window_secs", "aggregation.moving_average_days")
        key: String,
    },
    /// Set a config value and save it
    Set {
        /// Config key
        key: String,
        /// New value ("none" clears an optional value)
        value: String,
    },
    /// List all config values; the access token is masked
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the config file location
    Path,
    /// Reset config to defaults
    Reset {
        /// Keep the stored activity access token
        #[arg(long)]
        keep_token: bool,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            let shown = config.get(&key).unwrap_or_default();
            println!("{key} = {}", masked(&key, &shown));
        }
        ConfigAction::List { json } => {
            let mut config = Config::load()?;
            if json {
                if !config.activity.access_token.is_empty() {
                    config.activity.access_token = mask_token();
                }
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                for (key, value) in config.entries() {
                    println!("{key} = {}", masked(&key, &value));
                }
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
        ConfigAction::Reset { keep_token } => {
            let path = Config::path()?;
            let mut config = Config::default();
            if keep_token {
                config.activity.access_token = Config::load_from(&path)?.activity.access_token;
            }
            config.save_to(&path)?;
            println!("config reset to defaults at {}", path.display());
        }
    }
    Ok(())
}

fn masked<'a>(key: &str, value: &'a str) -> std::borrow::Cow<'a, str> {
    if key == TOKEN_KEY && !value.is_empty() {
        mask_token().into()
    } else {
        value.into()
    }
}

fn mask_token() -> String {
    "********".to_string()
}
