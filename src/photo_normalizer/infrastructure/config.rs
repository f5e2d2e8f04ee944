use super::error::InfrastructureError;
use crate::domain::budget::{EncodingBudget, AVATAR_MAX_DIMENSION_PX, DEFAULT_MAX_BYTES};
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3300";
pub const DEFAULT_POST_MAX_DIMENSION_PX: u32 = 4096;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub post_budget: EncodingBudget,
    pub avatar_budget: EncodingBudget,
}

impl Config {
    pub fn from_env() -> Result<Self, InfrastructureError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, InfrastructureError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr: SocketAddr = parse_or(&lookup, "PHOTO_NORMALIZER_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;
        let max_bytes: usize = parse_or(&lookup, "PHOTO_NORMALIZER_MAX_BYTES", Some(DEFAULT_MAX_BYTES))?;
        let avatar_dimension: u32 = parse_or(
            &lookup,
            "PHOTO_NORMALIZER_AVATAR_MAX_DIMENSION",
            Some(AVATAR_MAX_DIMENSION_PX),
        )?;
        let post_dimension: u32 = parse_or(
            &lookup,
            "PHOTO_NORMALIZER_POST_MAX_DIMENSION",
            Some(DEFAULT_POST_MAX_DIMENSION_PX),
        )?;

        Ok(Self {
            bind_addr,
            post_budget: EncodingBudget::new(max_bytes, post_dimension)?,
            avatar_budget: EncodingBudget::new(max_bytes, avatar_dimension)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, InfrastructureError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| InfrastructureError::ConfigurationError(format!("{}={:?}: {}", key, raw, e))),
        None => default.ok_or_else(|| InfrastructureError::ConfigurationError(format!("{} is not set", key))),
    }
}
