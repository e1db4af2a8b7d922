//! Canonical forms and identifier validation.
//!
//! The canonical form is what the storage unique index compares; the literal
//! identifier the user typed is stored unchanged next to it.

use ident_types::{EmailCanonicalization, IdentificationType};

use crate::IdentityError;

const MAX_EMAIL_LEN: usize = 320;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;
const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 64;

/// Canonical form of `raw` for identifications of `kind`. Idempotent.
pub fn canonicalize(kind: &IdentificationType, raw: &str, email: &EmailCanonicalization) -> String {
    match kind {
        IdentificationType::EmailAddress => canonical_email(raw, email),
        IdentificationType::PhoneNumber => canonical_phone(raw),
        IdentificationType::Username | IdentificationType::Web3Wallet => raw.trim().to_lowercase(),
        // Provider subjects and credential ids are case-sensitive.
        IdentificationType::OAuth(_) | IdentificationType::Saml | IdentificationType::Passkey => {
            raw.trim().to_string()
        }
    }
}

fn canonical_email(raw: &str, rules: &EmailCanonicalization) -> String {
    let lowered = raw.trim().to_lowercase();
    let Some((local, domain)) = lowered.rsplit_once('@') else {
        return lowered;
    };
    let listed = |domains: &[String]| domains.iter().any(|d| d.trim().eq_ignore_ascii_case(domain));

    // Stripping never empties the local part.
    let mut local = local.to_string();
    if listed(&rules.strip_plus_domains) {
        if let Some((head, _)) = local.split_once('+') {
            if !head.is_empty() {
                local = head.to_string();
            }
        }
    }
    if listed(&rules.strip_dots_domains) && local.chars().any(|c| c != '.') {
        local.retain(|c| c != '.');
    }
    format!("{local}@{domain}")
}

fn canonical_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    out
}

/// Reject identifiers that cannot be an identifier of `kind`.
pub fn validate(kind: &IdentificationType, identifier: Option<&str>) -> Result<(), IdentityError> {
    let raw = match identifier.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ if !kind.requires_identifier() => return Ok(()),
        _ => return Err(IdentityError::Validation(format!("{kind} requires an identifier"))),
    };

    let ok = match kind {
        IdentificationType::EmailAddress => is_email(raw),
        IdentificationType::PhoneNumber => is_phone(raw),
        IdentificationType::Username => is_username(raw),
        IdentificationType::Web3Wallet => is_web3_address(raw),
        IdentificationType::OAuth(_) | IdentificationType::Saml | IdentificationType::Passkey => {
            !raw.chars().any(char::is_control)
        }
    };
    if !ok {
        return Err(IdentityError::Validation(format!("`{raw}` is not a valid {kind}")));
    }
    Ok(())
}

fn is_email(raw: &str) -> bool {
    if raw.len() > MAX_EMAIL_LEN || raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = raw.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

fn is_phone(raw: &str) -> bool {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.');
    if !raw.starts_with('+') || raw[1..].contains('+') || !raw.chars().all(allowed) {
        return false;
    }
    let digits = raw.chars().filter(char::is_ascii_digit).count();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
}

fn is_username(raw: &str) -> bool {
    (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&raw.chars().count())
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_web3_address(raw: &str) -> bool {
    let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}
