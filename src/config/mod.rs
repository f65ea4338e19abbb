mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat, FileSourceFile};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, ClientSettings, HealthSettings, PersistenceSettings, PollingSettings, Settings,
};

/// Prefix of the environment variables read, e.g. `ALEXBUS_BROKER__URL`.
pub const ENV_PREFIX: &str = "ALEXBUS";

/// Loads `.env`, the optional `config/default` file and `ALEXBUS_*`
/// environment variables, merged over [`Settings::default`].
pub fn load_config() -> Result<Settings, ConfigError> {
    load(File::with_name("config/default").required(false))
}

/// Like [`load_config`] but reads the given file, which must exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    load(File::from(path.as_ref()).required(true))
}

fn load(file: File<FileSourceFile, FileFormat>) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge_over(Settings::default());
    settings.validate()?;
    Ok(settings)
}
