// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup. Malformed
//! values are fatal; missing values fall back to the defaults below.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `wg-panel.redb` | `./data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=info` |
//! | `JWT_ACCESS_SECRET` | HS256 signing secret for access tokens | development value, warns |
//! | `JWT_ACCESS_EXPIRY_MINUTES` | Access token lifetime | `15` |
//! | `JWT_REFRESH_EXPIRY_DAYS` | Refresh token lifetime | `7` |
//! | `ADMIN_USERNAME` | Bootstrap user | `admin` |
//! | `ADMIN_PASSWORD` | Bootstrap password | `admin`, warns |
//! | `WG_INTERFACE` | Live WireGuard interface | `wg0` |
//! | `WG_SUBNET` | Peer address space (/24) | `10.8.0.0/24` |
//! | `WG_SERVER_PUBLIC_KEY` | Server key written into client profiles | empty |
//! | `WG_SERVER_ENDPOINT` | `host:port` written into client profiles | empty |
//! | `WG_DNS` | Default client DNS | `1.1.1.1` |
//! | `WG_ALLOWED_IPS` | Default client AllowedIPs | `0.0.0.0/0` |
//! | `RATE_LIMIT_REQUESTS` | Login attempts per window and source | `5` |
//! | `RATE_LIMIT_WINDOW_SECONDS` | Login rate limit window | `60` |
//! | `SHUTDOWN_GRACE_SECONDS` | Drain time for in-flight requests | `10` |
//! | `COOKIE_SECURE` | Set `Secure` on the refresh cookie | `true` |
//! | `TLS_CERT_PATH` | PEM certificate chain, enables TLS with `TLS_KEY_PATH` | unset |
//! | `TLS_KEY_PATH` | PEM private key | unset |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::wireguard::interface::validate_interface_name;
use crate::wireguard::Subnet;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Directory for the redb file. Created on startup if missing.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const JWT_ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";
pub const JWT_ACCESS_EXPIRY_MINUTES_ENV: &str = "JWT_ACCESS_EXPIRY_MINUTES";
pub const JWT_REFRESH_EXPIRY_DAYS_ENV: &str = "JWT_REFRESH_EXPIRY_DAYS";

pub const ADMIN_USERNAME_ENV: &str = "ADMIN_USERNAME";
pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

pub const WG_INTERFACE_ENV: &str = "WG_INTERFACE";
pub const WG_SUBNET_ENV: &str = "WG_SUBNET";
pub const WG_SERVER_PUBLIC_KEY_ENV: &str = "WG_SERVER_PUBLIC_KEY";
pub const WG_SERVER_ENDPOINT_ENV: &str = "WG_SERVER_ENDPOINT";
pub const WG_DNS_ENV: &str = "WG_DNS";
pub const WG_ALLOWED_IPS_ENV: &str = "WG_ALLOWED_IPS";

pub const RATE_LIMIT_REQUESTS_ENV: &str = "RATE_LIMIT_REQUESTS";
pub const RATE_LIMIT_WINDOW_SECONDS_ENV: &str = "RATE_LIMIT_WINDOW_SECONDS";

pub const SHUTDOWN_GRACE_SECONDS_ENV: &str = "SHUTDOWN_GRACE_SECONDS";
pub const COOKIE_SECURE_ENV: &str = "COOKIE_SECURE";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// Name of the database file inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "wg-panel.redb";

pub const DEFAULT_JWT_ACCESS_SECRET: &str = "change-this-secret-in-production";
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    pub jwt_access_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub admin_username: String,
    pub admin_password: String,
    pub wg_interface: String,
    pub wg_subnet: Subnet,
    pub wg_server_public_key: String,
    pub wg_server_endpoint: String,
    pub wg_dns: String,
    pub wg_allowed_ips: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub shutdown_grace: Duration,
    pub cookie_secure: bool,
    pub tls: Option<TlsPaths>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let string = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let host: IpAddr = parse(HOST_ENV, get(HOST_ENV), "IP address", "0.0.0.0".parse().ok())?;
        let port: u16 = parse(PORT_ENV, get(PORT_ENV), "port", Some(8080))?;

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    expected: "log format (json or pretty)",
                    value: other.to_string(),
                })
            }
        };

        let access_minutes: u32 = parse(
            JWT_ACCESS_EXPIRY_MINUTES_ENV,
            get(JWT_ACCESS_EXPIRY_MINUTES_ENV),
            "positive number of minutes",
            Some(15),
        )?;
        let refresh_days: u32 = parse(
            JWT_REFRESH_EXPIRY_DAYS_ENV,
            get(JWT_REFRESH_EXPIRY_DAYS_ENV),
            "positive number of days",
            Some(7),
        )?;
        if access_minutes == 0 {
            return Err(invalid(JWT_ACCESS_EXPIRY_MINUTES_ENV, "positive number of minutes", "0"));
        }
        if refresh_days == 0 {
            return Err(invalid(JWT_REFRESH_EXPIRY_DAYS_ENV, "positive number of days", "0"));
        }

        let wg_interface = string(WG_INTERFACE_ENV, "wg0");
        if !validate_interface_name(&wg_interface) {
            return Err(invalid(WG_INTERFACE_ENV, "interface name", &wg_interface));
        }
        let wg_subnet: Subnet = parse(
            WG_SUBNET_ENV,
            get(WG_SUBNET_ENV),
            "/24 subnet",
            "10.8.0.0/24".parse().ok(),
        )?;

        let rate_limit_requests: u32 = parse(
            RATE_LIMIT_REQUESTS_ENV,
            get(RATE_LIMIT_REQUESTS_ENV),
            "request count",
            Some(5),
        )?;
        if rate_limit_requests == 0 {
            return Err(invalid(RATE_LIMIT_REQUESTS_ENV, "request count", "0"));
        }
        let window_secs: u64 = parse(
            RATE_LIMIT_WINDOW_SECONDS_ENV,
            get(RATE_LIMIT_WINDOW_SECONDS_ENV),
            "number of seconds",
            Some(60),
        )?;
        if window_secs == 0 {
            return Err(invalid(RATE_LIMIT_WINDOW_SECONDS_ENV, "number of seconds", "0"));
        }
        let grace_secs: u64 = parse(
            SHUTDOWN_GRACE_SECONDS_ENV,
            get(SHUTDOWN_GRACE_SECONDS_ENV),
            "number of seconds",
            Some(10),
        )?;

        let cookie_secure = match get(COOKIE_SECURE_ENV).as_deref() {
            None => true,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(other) => return Err(invalid(COOKIE_SECURE_ENV, "boolean", other)),
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            data_dir: string(DATA_DIR_ENV, "./data").into(),
            log_format,
            jwt_access_secret: string(JWT_ACCESS_SECRET_ENV, DEFAULT_JWT_ACCESS_SECRET),
            access_token_ttl: chrono::Duration::minutes(i64::from(access_minutes)),
            refresh_token_ttl: chrono::Duration::days(i64::from(refresh_days)),
            admin_username: string(ADMIN_USERNAME_ENV, DEFAULT_ADMIN_USERNAME),
            admin_password: string(ADMIN_PASSWORD_ENV, DEFAULT_ADMIN_PASSWORD),
            wg_interface,
            wg_subnet,
            wg_server_public_key: string(WG_SERVER_PUBLIC_KEY_ENV, ""),
            wg_server_endpoint: string(WG_SERVER_ENDPOINT_ENV, ""),
            wg_dns: string(WG_DNS_ENV, "1.1.1.1"),
            wg_allowed_ips: string(WG_ALLOWED_IPS_ENV, "0.0.0.0/0"),
            rate_limit_requests,
            rate_limit_window: Duration::from_secs(window_secs),
            shutdown_grace: Duration::from_secs(grace_secs),
            cookie_secure,
            tls,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Log a warning for every credential still at its shipped default.
    pub fn warn_insecure_defaults(&self) {
        if self.jwt_access_secret == DEFAULT_JWT_ACCESS_SECRET {
            tracing::warn!("{JWT_ACCESS_SECRET_ENV} is not set; using the development secret");
        }
        if self.admin_password == DEFAULT_ADMIN_PASSWORD {
            tracing::warn!("{ADMIN_PASSWORD_ENV} is not set; the admin password is the default");
        }
        if self.wg_server_public_key.is_empty() || self.wg_server_endpoint.is_empty() {
            tracing::warn!(
                "{WG_SERVER_PUBLIC_KEY_ENV} or {WG_SERVER_ENDPOINT_ENV} is empty; exported client profiles will be incomplete"
            );
        }
    }
}

fn invalid(name: &'static str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        expected,
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    expected: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| invalid(name, expected, &value)),
        None => default.ok_or_else(|| invalid(name, expected, "")),
    }
}
