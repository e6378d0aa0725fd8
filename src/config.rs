use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

pub const DEFAULT_JWT_SECRET: &str = "default_secret_key";
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 3600;
// 2^18 KiB, a quarter of a GiB per hash
const MAX_SCRYPT_LOG_N: i64 = 18;

/// Process configuration. Every flag can also come from the environment,
/// which is how deployments are expected to set it.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Config {
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./arsip.sqlite")]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 30)]
    pub db_acquire_timeout_secs: u64,

    #[arg(long, env = "STORAGE_PATH", default_value = "./uploads")]
    pub storage_path: PathBuf,

    #[arg(long, env = "JWT_SECRET", default_value = DEFAULT_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// Session token lifetime, at most a year
    #[arg(
        long,
        env = "TOKEN_TTL_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECS)
    )]
    pub token_ttl_secs: u64,

    /// scrypt cost, as log2(N)
    #[arg(
        long,
        env = "SCRYPT_LOG_N",
        default_value_t = 15,
        value_parser = clap::value_parser!(u8).range(1..=MAX_SCRYPT_LOG_N)
    )]
    pub scrypt_log_n: u8,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 512 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Keep only the last path component of uploaded file names.
    #[arg(long, env = "SANITIZE_FILENAMES", default_value_t = false, action = ArgAction::Set)]
    pub sanitize_filenames: bool,

    /// When false, uploading over an existing name is rejected with 409.
    #[arg(long, env = "OVERWRITE_UPLOADS", default_value_t = true, action = ArgAction::Set)]
    pub overwrite_uploads: bool,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((self.bind_address, self.port))
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }

    pub fn token_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.token_ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "arsip",
            "--port",
            "8080",
            "--storage-path",
            "/tmp/files",
            "--jwt-secret",
            "s3cr3t",
            "--overwrite-uploads",
            "false",
        ])
        .unwrap();

        assert_eq!(config.listen_addr().port(), 8080);
        assert_eq!(config.storage_path, PathBuf::from("/tmp/files"));
        assert!(!config.uses_default_secret());
        assert!(!config.overwrite_uploads);
        assert_eq!(config.token_ttl(), time::Duration::hours(1));
    }

    #[test]
    fn out_of_range_costs_are_refused() {
        for args in [
            ["arsip", "--token-ttl-secs", "0"],
            ["arsip", "--token-ttl-secs", "18446744073709551615"],
            ["arsip", "--scrypt-log-n", "30"],
            ["arsip", "--scrypt-log-n", "0"],
        ] {
            assert!(Config::try_parse_from(args).is_err(), "{args:?} was accepted");
        }

        let config = Config::try_parse_from([
            "arsip",
            "--token-ttl-secs",
            "31536000",
            "--scrypt-log-n",
            "18",
        ])
        .unwrap();
        assert_eq!(config.token_ttl(), time::Duration::days(365));
        assert_eq!(config.scrypt_log_n, 18);
    }
}
