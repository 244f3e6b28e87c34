use std::env::{self, VarError};
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{invalid_config_error, Error};
use crate::geo::MAX_POSITION_TTL_SECS;
use crate::hub::HubConfig;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub store: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub geo_backend: String,
    pub geo_position_ttl_secs: u64,
    pub hub: HubConfig,
}

impl Config {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| match env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(err) => Err(err.into()),
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Result<Option<String>, Error>,
    {
        let parse = |name: &str, default: &str| -> Result<String, Error> {
            Ok(lookup(name)?
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string()))
        };

        let geo_position_ttl_secs: u64 = typed(&parse, "GEO_POSITION_TTL_SECS", "60")?;
        if geo_position_ttl_secs > MAX_POSITION_TTL_SECS {
            return Err(invalid_config_error("GEO_POSITION_TTL_SECS"));
        }

        Ok(Self {
            listen_addr: typed(&parse, "DROVER_LISTEN_ADDR", "127.0.0.1:3000")?,
            store: parse("DROVER_STORE", "memory")?,
            database_url: lookup("DATABASE_URL")?.filter(|url| !url.trim().is_empty()),
            database_max_connections: typed(&parse, "DATABASE_MAX_CONNECTIONS", "5")?,
            geo_backend: parse("GEO_BACKEND", "memory")?,
            geo_position_ttl_secs,
            hub: HubConfig {
                outbound_buffer: typed(&parse, "HUB_OUTBOUND_BUFFER", "32")?,
                command_buffer: typed(&parse, "HUB_COMMAND_BUFFER", "256")?,
            },
        })
    }

    pub fn needs_database(&self) -> bool {
        self.store == "postgres" || self.geo_backend == "postgis"
    }
}

fn typed<T, F>(parse: &F, name: &str, default: &str) -> Result<T, Error>
where
    T: FromStr,
    F: Fn(&str, &str) -> Result<String, Error>,
{
    parse(name, default)?
        .parse()
        .map_err(|_| invalid_config_error(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_lookup(|name| Ok(vars.get(name).cloned()))
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.store, "memory");
        assert_eq!(config.database_url, None);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.geo_backend, "memory");
        assert_eq!(config.geo_position_ttl_secs, 60);
        assert_eq!(config.hub, HubConfig::default());
        assert!(!config.needs_database());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("DROVER_LISTEN_ADDR", "0.0.0.0:8080"),
            ("DROVER_STORE", "postgres"),
            ("DATABASE_URL", "postgres://drover@localhost/drover"),
            ("GEO_BACKEND", "postgis"),
            ("GEO_POSITION_TTL_SECS", "0"),
            ("HUB_OUTBOUND_BUFFER", " 8 "),
        ])
        .unwrap();

        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.geo_position_ttl_secs, 0);
        assert_eq!(config.hub.outbound_buffer, 8);
        assert_eq!(config.hub.command_buffer, 256);
        assert!(config.needs_database());
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config(&[("HUB_COMMAND_BUFFER", "lots")]).unwrap_err();
        assert_eq!(err, invalid_config_error("HUB_COMMAND_BUFFER"));

        let err = config(&[("DROVER_LISTEN_ADDR", "localhost")]).unwrap_err();
        assert_eq!(err, invalid_config_error("DROVER_LISTEN_ADDR"));

        let err = config(&[("GEO_POSITION_TTL_SECS", "-1")]).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn position_ttl_is_capped() {
        let cfg = config(&[("GEO_POSITION_TTL_SECS", "86400")]).unwrap();
        assert_eq!(cfg.geo_position_ttl_secs, MAX_POSITION_TTL_SECS);

        for huge in ["86401", "18446744073709551615"] {
            let err = config(&[("GEO_POSITION_TTL_SECS", huge)]).unwrap_err();
            assert_eq!(err, invalid_config_error("GEO_POSITION_TTL_SECS"));
        }
    }
}
