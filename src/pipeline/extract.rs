// src/pipeline/extract.rs

//! Typed extraction of values from free-form command output.
//!
//! One function per expected output shape. Each either returns the value or
//! a `ParseError` naming what was missing; callers never apply patterns
//! inline.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{ProvisionError, Result};

static BILLING_ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"name = (billingAccounts/[^\r\n]*)").expect("static regex"));

static CREATED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"created key \[([^\]]*)\]").expect("static regex"));

static REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9a-f]{7,40})\b").expect("static regex"));

/// Clean up the text matched by the login prompt pattern.
pub fn login_url(matched: &str) -> Result<String> {
    let url: String = matched.chars().filter(|c| *c != '\r').collect();
    let url = url.trim();
    if url.is_empty() {
        return Err(ProvisionError::ParseError { what: "login URL" });
    }
    Ok(url.to_string())
}

/// First `billingAccounts/<id>` in `gcloud beta billing accounts list --format=config`.
pub fn billing_account(output: &str) -> Result<String> {
    BILLING_ACCOUNT
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s != "billingAccounts/")
        .ok_or(ProvisionError::ParseError {
            what: "billing account",
        })
}

/// Key id from `created key [<id>] of type [json] ...`.
pub fn created_key_id(output: &str) -> Result<String> {
    CREATED_KEY
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ProvisionError::ParseError {
            what: "service account key id",
        })
}

/// Commit hash printed by `git rev-parse HEAD`.
pub fn revision_id(output: &str) -> Result<String> {
    REVISION
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ProvisionError::ParseError {
            what: "revision id",
        })
}

/// Membership test used by every check-before-create step.
///
/// Plain substring search over the listing output. A name that is a prefix
/// of an existing one (`demo-1` vs `demo-10`) counts as present.
pub fn contains_resource(listing: &str, name: &str) -> bool {
    listing.contains(name)
}
