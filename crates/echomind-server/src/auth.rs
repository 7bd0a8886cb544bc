//! Credential extraction and verification.
//!
//! A credential is read from `Authorization: Bearer <token>`, falling back to
//! `X-API-KEY: <token>`. The verifier behind [`TokenVerifier`] turns it into a
//! [`Principal`]; handlers receive the result through [`Authenticated`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use echomind_core::Principal;

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredential,
    #[error("invalid credentials")]
    InvalidCredential,
}

/// Maps a raw credential to the principal it belongs to.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// Fixed token table, loaded from settings.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new<I, T, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, P)>,
        T: Into<String>,
        P: Into<String>,
    {
        Self {
            tokens: entries
                .into_iter()
                .map(|(token, principal)| (token.into(), Principal::from_raw(principal)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}

/// Bearer token first, then the API key header. Blank values count as absent.
pub fn extract_credential(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    })
}

/// Extractor yielding the verified caller.
#[derive(Clone, Debug)]
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    Arc<dyn TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let credential = extract_credential(&parts.headers).ok_or(AuthError::MissingCredential)?;
        let verifier = Arc::<dyn TokenVerifier>::from_ref(state);
        match verifier.verify(credential) {
            Ok(principal) => Ok(Self(principal)),
            Err(e) => {
                tracing::debug!(error = %e, "credential rejected");
                Err(e.into())
            }
        }
    }
}
