//! Layered configuration for larder.
//!
//! Sources, later ones winning:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. The config file: an explicit path, or `config.toml` in the platform
//!    config directory (`~/.config/larder/` on Linux) when it exists. TOML,
//!    YAML and JSON are accepted, chosen by extension.
//! 3. `LARDER_*` environment variables; `__` separates nested keys, so
//!    `LARDER_LEDGER__CAPACITY=1000` sets `ledger.capacity`.
//! 4. [`Overrides`] from the command line.
//!
//! ```toml
//! vault = "/home/me/Notes"
//! inbox = "Inbox"
//! archive = "Inbox/Archive"
//! output = "Recipes"
//! filename = "{{ title|slug }}"
//!
//! [ledger]
//! path = ".larder/ledger.json"
//! capacity = 500
//!
//! [scan]
//! interval = 300
//! concurrency = 4
//! settle = 750
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use larder_document::FileNamer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "LARDER_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path of the vault every other path is relative to.
    pub vault: Option<PathBuf>,
    pub inbox: PathBuf,
    pub archive: PathBuf,
    pub output: PathBuf,
    /// Template naming each document; see [`larder_document::template`].
    pub filename: String,
    pub ledger: LedgerConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// Most recent entries kept.
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Seconds between periodic scans while watching; `0` disables them.
    pub interval: u64,
    /// Files processed at once.
    pub concurrency: usize,
    /// Milliseconds a file must stay quiet before a change is handled.
    pub settle: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: None,
            inbox: PathBuf::from("Inbox"),
            archive: PathBuf::from("Inbox/Archive"),
            output: PathBuf::from("Recipes"),
            filename: larder_document::template::DEFAULT_TEMPLATE.to_string(),
            ledger: LedgerConfig { path: PathBuf::from(".larder/ledger.json"), capacity: 500 },
            scan: ScanConfig { interval: 300, concurrency: 4, settle: 750 },
        }
    }
}

/// Settings given on the command line. Unset fields leave the other sources
/// alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<PathBuf>,
}

impl Config {
    /// `config.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.config_dir().join("larder").join("config.toml"))
    }

    /// Loads and validates the configuration.
    ///
    /// An explicit `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(file) if !file.is_file() => exn::bail!(ErrorKind::NotFound(file.to_path_buf())),
            Some(file) => Some(file.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        tracing::debug!(file = ?file, "Loading configuration");
        Self::from_figment(Self::figment(file.as_deref(), overrides)?)
    }

    /// Every source merged, without validation. `file` is read as given and
    /// the default location is not consulted.
    pub fn figment(file: Option<&Path>, overrides: &Overrides) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            let extension = file.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase());
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")).merge(Serialized::defaults(overrides)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|err| exn::Exn::from(ErrorKind::Parse(err.to_string())))?;
        config.validated()
    }

    /// Checks every setting and normalizes the vault-relative paths.
    pub fn validated(self) -> Result<Self> {
        let vault = match self.vault {
            Some(vault) if vault.is_absolute() => vault,
            Some(vault) => exn::bail!(ErrorKind::Invalid {
                field: "vault",
                reason: format!("must be an absolute path, got {}", vault.display()),
            }),
            None => exn::bail!(ErrorKind::Invalid { field: "vault", reason: "not set".to_string() }),
        };
        if self.ledger.capacity == 0 {
            exn::bail!(ErrorKind::Invalid { field: "ledger.capacity", reason: "must be at least 1".to_string() });
        }
        if self.scan.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid { field: "scan.concurrency", reason: "must be at least 1".to_string() });
        }
        self.filename.parse::<FileNamer>().or_raise(|| ErrorKind::Invalid {
            field: "filename",
            reason: "template does not compile".to_string(),
        })?;
        Ok(Self {
            vault: Some(vault),
            inbox: relative("inbox", &self.inbox)?,
            archive: relative("archive", &self.archive)?,
            output: relative("output", &self.output)?,
            ledger: LedgerConfig { path: relative("ledger.path", &self.ledger.path)?, ..self.ledger },
            ..self
        })
    }

    /// The vault root. Always set on a validated config.
    pub fn vault(&self) -> &Path {
        self.vault.as_deref().unwrap_or(Path::new("/"))
    }

    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan.interval > 0).then(|| Duration::from_secs(self.scan.interval))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.scan.settle)
    }
}

fn relative(field: &'static str, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        exn::bail!(ErrorKind::Invalid { field, reason: "must be relative to the vault".to_string() });
    }
    larder_storage::validate_path(path)
        .or_raise(|| ErrorKind::Invalid { field, reason: format!("not a usable path: {}", path.display()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load_in(jail: &Jail, file: &str) -> Result<Config> {
        Config::from_figment(Config::figment(Some(jail.directory().join(file).as_path()), &Overrides::default())?)
    }

    #[test]
    fn test_defaults_need_only_a_vault() {
        Jail::expect_with(|jail| {
            jail.create_file("larder.toml", r#"vault = "/srv/notes""#)?;
            let config = load_in(jail, "larder.toml").unwrap();
            assert_eq!(config.vault(), Path::new("/srv/notes"));
            assert_eq!(config.inbox, Path::new("Inbox"));
            assert_eq!(config.archive, Path::new("Inbox/Archive"));
            assert_eq!(config.ledger.capacity, 500);
            assert_eq!(config.scan_interval(), Some(Duration::from_secs(300)));
            assert_eq!(config.settle(), Duration::from_millis(750));
            Ok(())
        });
    }

    #[rstest]
    #[case("larder.toml", "vault = \"/srv/notes\"\n[scan]\nconcurrency = 2\n")]
    #[case("larder.yaml", "vault: /srv/notes\nscan:\n  concurrency: 2\n")]
    #[case("larder.json", r#"{"vault": "/srv/notes", "scan": {"concurrency": 2}}"#)]
    fn test_reads_every_format(#[case] file: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(file, contents)?;
            let config = load_in(jail, file).unwrap();
            assert_eq!(config.scan.concurrency, 2);
            assert_eq!(config.scan.interval, 300);
            Ok(())
        });
    }

    #[test]
    fn test_environment_beats_file_and_overrides_beat_both() {
        Jail::expect_with(|jail| {
            jail.create_file("larder.toml", "vault = \"/srv/notes\"\n[ledger]\ncapacity = 10\n")?;
            jail.set_env("LARDER_LEDGER__CAPACITY", "20");
            jail.set_env("LARDER_VAULT", "/srv/env");
            let overrides = Overrides { vault: Some(PathBuf::from("/srv/cli")) };
            let file = jail.directory().join("larder.toml");
            let config = Config::from_figment(Config::figment(Some(file.as_path()), &overrides).unwrap()).unwrap();
            assert_eq!(config.ledger.capacity, 20);
            assert_eq!(config.vault(), Path::new("/srv/cli"));
            Ok(())
        });
    }

    #[test]
    fn test_normalizes_relative_paths() {
        Jail::expect_with(|jail| {
            jail.create_file("larder.toml", "vault = \"/srv/notes\"\ninbox = \"./Inbox/\"\narchive = \"Inbox//Done\"\n")?;
            let config = load_in(jail, "larder.toml").unwrap();
            assert_eq!(config.inbox, Path::new("Inbox"));
            assert_eq!(config.archive, Path::new("Inbox/Done"));
            Ok(())
        });
    }

    #[rstest]
    #[case("inbox = \"Inbox\"\n", "vault")]
    #[case("vault = \"relative/notes\"\n", "vault")]
    #[case("vault = \"/srv\"\ninbox = \"/abs\"\n", "inbox")]
    #[case("vault = \"/srv\"\narchive = \"../up\"\n", "archive")]
    #[case("vault = \"/srv\"\n[ledger]\ncapacity = 0\n", "ledger.capacity")]
    #[case("vault = \"/srv\"\n[scan]\nconcurrency = 0\n", "scan.concurrency")]
    #[case("vault = \"/srv\"\nfilename = \"{{ title\"\n", "filename")]
    fn test_rejects_invalid_settings(#[case] contents: &str, #[case] expected: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("larder.toml", contents)?;
            let err = load_in(jail, "larder.toml").unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid { field, .. } if *field == expected), "{err:?}");
            Ok(())
        });
    }

    #[test]
    fn test_type_errors_are_parse_errors() {
        Jail::expect_with(|jail| {
            jail.create_file("larder.toml", "vault = \"/srv\"\n[scan]\ninterval = \"soon\"\n")?;
            let err = load_in(jail, "larder.toml").unwrap_err();
            assert!(matches!(&*err, ErrorKind::Parse(message) if message.contains("interval")));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("absent.toml").as_path()), &Overrides::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("larder.ini");
        std::fs::write(&file, "vault=/srv").unwrap();
        let err = Config::load(Some(file.as_path()), &Overrides::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_zero_interval_disables_periodic_scans() {
        let config = Config { scan: ScanConfig { interval: 0, ..Config::default().scan }, ..Config::default() };
        assert_eq!(config.scan_interval(), None);
    }
}
