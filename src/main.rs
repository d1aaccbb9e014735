mod config;
mod errors;
mod http;
mod models;
mod overpass;
mod pipeline;
mod repositories;
mod transform;
mod validation;
mod wikidata;

use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use env_logger::Env;
use native_tls::{Certificate, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use std::{env, fs, process};
use tokio_postgres::NoTls;

use crate::errors::ImportError;
use crate::overpass::{LevelRange, OverpassClient};
use crate::pipeline::Importer;
use crate::wikidata::WikidataClient;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
    let cfg = config::Config::from_env();

    // An ISO3 argument selects single-country mode; without it the whole
    // catalogue is walked.
    let iso3 = match env::args().nth(1) {
        Some(arg) => match validation::validate_iso3(&arg) {
            Ok(code) => Some(code),
            Err(err) => {
                log::error!("{}", err);
                process::exit(1);
            }
        },
        None => None,
    };
    if let Err(err) = validation::validate_level_range(cfg.level_min, cfg.level_max) {
        log::error!("{}", err);
        process::exit(1);
    }
    let range = LevelRange { min: cfg.level_min, max: cfg.level_max };

    let pool = build_pool(&cfg);
    let overpass = match OverpassClient::new(&cfg.overpass_url) {
        Ok(client) => client,
        Err(err) => {
            log::error!("overpass client: {}", err);
            process::exit(1);
        }
    };
    let wikidata = match WikidataClient::new(&cfg.wikidata_url) {
        Ok(client) => client,
        Err(err) => {
            log::error!("wikidata client: {}", err);
            process::exit(1);
        }
    };

    let importer = Importer::new(pool.clone(), overpass, wikidata);

    let outcome = tokio::select! {
        outcome = run(&importer, iso3.as_deref(), range) => outcome,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the pipeline future abandons in-flight requests and
            // rolls back any open transaction.
            log::warn!("interrupted, shutting down");
            pool.close();
            process::exit(130);
        }
    };

    pool.close();
    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(err) => {
            log::error!("import aborted: {}", err);
            process::exit(1);
        }
    }
}

async fn run(
    importer: &Importer,
    iso3: Option<&str>,
    range: LevelRange,
) -> Result<bool, ImportError> {
    match iso3 {
        Some(code) => importer
            .run_country(code, range)
            .await
            .map(|summary| summary.row_errors.is_empty()),
        None => importer.run_all(range).await,
    }
}

fn build_pool(cfg: &config::Config) -> Pool {
    let pg_config: tokio_postgres::Config =
        cfg.database_url.parse().expect("invalid DATABASE_URL");

    let mut pool_cfg = PgConfig::new();
    if let Some(host) = pg_config.get_hosts().first() {
        match host {
            tokio_postgres::config::Host::Tcp(h) => pool_cfg.host = Some(h.clone()),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(p) => {
                pool_cfg.host = Some(p.to_string_lossy().into())
            }
        }
    }
    if let Some(port) = pg_config.get_ports().first() {
        pool_cfg.port = Some(*port);
    }
    if let Some(user) = pg_config.get_user() {
        pool_cfg.user = Some(user.into());
    }
    if let Some(pw) = pg_config.get_password() {
        pool_cfg.password = Some(String::from_utf8_lossy(pw).into());
    }
    if let Some(db) = pg_config.get_dbname() {
        pool_cfg.dbname = Some(db.into());
    }

    pool_cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
    let mut pool_config = PoolConfig::new(cfg.pool_size);
    pool_config.timeouts = Timeouts {
        wait: Some(std::time::Duration::from_secs(5)),
        create: Some(std::time::Duration::from_secs(5)),
        recycle: Some(std::time::Duration::from_secs(5)),
    };
    pool_cfg.pool = Some(pool_config);

    let ssl_mode = DbSslMode::from_database_url(&cfg.database_url);
    if ssl_mode == DbSslMode::Disable {
        log::warn!("Database TLS mode: disabled (sslmode=disable)");
        return pool_cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .expect("failed to create database connection pool");
    }

    let mut tls_builder = TlsConnector::builder();
    if matches!(ssl_mode, DbSslMode::Require | DbSslMode::Prefer) {
        // Match libpq `sslmode=require`: encrypt traffic but skip cert/hostname checks.
        tls_builder.danger_accept_invalid_certs(true);
        tls_builder.danger_accept_invalid_hostnames(true);
    }
    add_ssl_root_cert_if_present(&cfg.database_url, &mut tls_builder);

    let native_tls = tls_builder.build().expect("failed to initialize TLS connector");
    let tls = MakeTlsConnector::new(native_tls);
    log::info!("Database TLS mode: {}", ssl_mode.as_str());
    pool_cfg
        .create_pool(Some(Runtime::Tokio1), tls)
        .expect("failed to create TLS database connection pool")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DbSslMode {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl DbSslMode {
    fn from_database_url(database_url: &str) -> Self {
        match extract_query_param(database_url, "sslmode")
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("disable") => Self::Disable,
            Some("verify-ca") => Self::VerifyCa,
            Some("verify-full") => Self::VerifyFull,
            Some("require") => Self::Require,
            Some("prefer") => Self::Prefer,
            _ => Self::Disable,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Disable => "disabled",
            Self::Prefer => "prefer (TLS with non-strict verification)",
            Self::Require => "require (TLS with non-strict verification)",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

fn extract_query_param(database_url: &str, key: &str) -> Option<String> {
    let (_, query) = database_url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.eq_ignore_ascii_case(key) {
            Some(value.to_string())
        } else {
            None
        }
    })
}

fn add_ssl_root_cert_if_present(database_url: &str, tls_builder: &mut native_tls::TlsConnectorBuilder) {
    let cert_path = extract_query_param(database_url, "sslrootcert")
        .or_else(|| env::var("PGSSLROOTCERT").ok())
        .or_else(|| env::var("DATABASE_SSL_ROOT_CERT").ok());

    let Some(cert_path) = cert_path else {
        return;
    };

    match fs::read(&cert_path) {
        Ok(cert_bytes) => match Certificate::from_pem(&cert_bytes) {
            Ok(cert) => {
                tls_builder.add_root_certificate(cert);
                log::info!("Loaded database root certificate from {cert_path}");
            }
            Err(err) => {
                log::warn!("Failed to parse database root certificate at {cert_path}: {err}");
            }
        },
        Err(err) => {
            log::warn!("Failed to read database root certificate at {cert_path}: {err}");
        }
    }
}
