//! Process configuration read from the environment (and `.env`, via [`dotenvy`]).
//!
//! The deserializer below maps `SCREAMING_SNAKE_CASE` variables onto a plain serde struct so
//! `rename`-style derive attributes keep working; optional fields are `None` when the variable
//! is absent or empty.

use std::iter::empty;
use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

/// Loads (once) and returns the process configuration.
pub async fn env() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = env().await?;
    Ok(match var {
        Var::DatabaseUrl => &vars.database_url,
        Var::AuthTokenSecret => &vars.auth_token_secret,
        Var::ApiServiceName => &vars.api_service_name,
        Var::ApiTracerName => &vars.api_tracer_name,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_port")]
    pub server_api_port: u16,
    pub auth_token_secret: String,
    /// Comma-separated origin suffixes; `*` admits any origin.
    #[serde(default = "default_cors")]
    pub cors_allow_origins: Vec<String>,
    #[serde(default)]
    pub storage_backend: StorageBackend,
    /// JSON directory records loaded into the memory store at startup.
    pub seed_file: Option<String>,
    pub push_gateway_url: Option<String>,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
    #[serde(default = "default_tracer_name")]
    pub api_tracer_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

fn default_port() -> u16 {
    3000
}

fn default_cors() -> Vec<String> {
    vec![String::from("*")]
}

fn default_service_name() -> String {
    String::from("salonbook-api")
}

fn default_tracer_name() -> String {
    String::from("salonbook-tracer")
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        let env = from_env::<Env>()?;
        if env.storage_backend == StorageBackend::Postgres && env.database_url.is_empty() {
            return Err(EnvErr::Invalid(
                "DATABASE_URL is required when STORAGE_BACKEND=postgres".into(),
            ));
        }

        Ok(env)
    }
}

#[derive(Debug)]
pub enum Var {
    DatabaseUrl,
    AuthTokenSecret,
    ApiServiceName,
    ApiTracerName,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

// ---
//  Deserializer implementation
// ---

/// A single variable's value, tagged with its name for error messages.
struct EnvValue {
    name: String,
    raw: String,
}

struct EnvKey(String);

struct EnvMap<Iter: Iterator<Item = (String, String)>> {
    inner: Iter,
}

impl<Iter: Iterator<Item = (String, String)>> Iterator for EnvMap<Iter> {
    type Item = (EnvKey, EnvValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(name, raw)| {
            (
                EnvKey(name.clone()),
                EnvValue {
                    name,
                    raw: raw.trim().to_owned(),
                },
            )
        })
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvValue {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvKey {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! parse_scalar {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>
            {
                match self.raw.parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{} is not a valid value for {}: {}",
                        self.raw, self.name, e
                    ))),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for EnvValue {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.raw.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.raw.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.raw.is_empty() {
            return SeqDeserializer::new(empty::<EnvValue>()).deserialize_seq(visitor);
        }

        let name = self.name;
        let items = self
            .raw
            .split(',')
            .map(|v| EnvValue {
                name: name.clone(),
                raw: v.trim().to_owned(),
            })
            .collect::<Vec<_>>();

        SeqDeserializer::new(items.into_iter()).deserialize_seq(visitor)
    }

    fn deserialize_enum<V>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_enum(self.raw.to_lowercase().into_deserializer())
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    parse_scalar! {
        bool => deserialize_bool,
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i8 => deserialize_i8,
        i16 => deserialize_i16,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
        f32 => deserialize_f32,
        f64 => deserialize_f64,
    }

    serde::forward_to_deserialize_any! {
        char str string unit bytes byte_buf map
        unit_struct tuple_struct identifier tuple
        ignored_any struct
    }
}

impl<'de> de::Deserializer<'de> for EnvKey {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.0.into_deserializer().deserialize_any(visitor)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map
        unit_struct newtype_struct tuple_struct identifier tuple ignored_any
        bool u8 u16 u32 u64 i8 i16 i32 i64 f32 f64 enum struct
    }
}

pub fn from_env<T>() -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
{
    from_iter(dotenvy::vars())
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let map = MapDeserializer::new(EnvMap {
        inner: iter.into_iter(),
    });

    T::deserialize(de::value::MapAccessDeserializer::new(map))
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.to_uppercase())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_defaults_and_optionals() {
        let env: Env = from_iter(vars(&[
            ("AUTH_TOKEN_SECRET", "hunter2"),
            ("STORAGE_BACKEND", "Memory"),
            ("PUSH_GATEWAY_URL", ""),
            ("UNRELATED_VAR", "ignored"),
        ]))
        .unwrap();

        assert_eq!(env.server_api_port, 3000);
        assert_eq!(env.storage_backend, StorageBackend::Memory);
        assert_eq!(env.cors_allow_origins, vec!["*"]);
        assert!(env.push_gateway_url.is_none());
        assert!(env.otel_exporter_otlp_endpoint.is_none());
    }

    #[test]
    fn test_env_origin_list() {
        let env: Env = from_iter(vars(&[
            ("AUTH_TOKEN_SECRET", "hunter2"),
            ("CORS_ALLOW_ORIGINS", "example.com, book.salon.app ,"),
        ]))
        .unwrap();

        assert_eq!(
            env.cors_allow_origins,
            vec!["example.com", "book.salon.app", ""]
        );

        let empty: Env = from_iter(vars(&[
            ("AUTH_TOKEN_SECRET", "hunter2"),
            ("CORS_ALLOW_ORIGINS", ""),
        ]))
        .unwrap();
        assert!(empty.cors_allow_origins.is_empty());
    }

    #[test]
    fn test_env_parse_errors() {
        let bad_port = from_iter::<_, Env>(vars(&[
            ("AUTH_TOKEN_SECRET", "hunter2"),
            ("SERVER_API_PORT", "not-a-port"),
        ]));
        assert!(matches!(bad_port, Err(EnvDeserializeError::Custom(_))));

        let missing = from_iter::<_, Env>(vars(&[("SERVER_API_PORT", "8080")]));
        assert!(matches!(missing, Err(EnvDeserializeError::MissingValue(v)) if v == "AUTH_TOKEN_SECRET"));
    }
}
