//! Public share links.
//!
//! A proposal is reachable at `/p/:token` once sharing is public. The token
//! is opaque: 122 random bits (a v4 uuid) in URL-safe base64, minted
//! the first time sharing is turned on and kept when it is turned off, so
//! re-enabling brings back the same link.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use qrcode::render::svg;
use qrcode::types::QrError;
use qrcode::QrCode;
use thiserror::Error;
use uuid::Uuid;

use crate::model::Proposal;
use crate::mutate::touch;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("Could not encode share link as a QR code: {0}")]
    Qr(#[from] QrError),

    #[error("Proposal {0} is not shared publicly")]
    NotPublic(String),
}

/// Mint a fresh share token.
pub fn generate_token() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// Turn public sharing on or off, minting a token on first enable.
pub fn set_sharing(proposal: &Proposal, public: bool, allow_comments: Option<bool>) -> Proposal {
    let mut next = proposal.clone();
    let sharing = &mut next.settings.sharing;
    sharing.public = public;
    if let Some(allow) = allow_comments {
        sharing.allow_comments = allow;
    }
    if public && sharing.token.as_deref().map_or(true, str::is_empty) {
        sharing.token = Some(generate_token());
        tracing::info!(proposal = %proposal.id, "Minted share token");
    }
    touch(next)
}

pub fn enable_sharing(proposal: &Proposal, public: bool) -> Proposal {
    set_sharing(proposal, public, None)
}

/// `{base}/p/{token}`.
pub fn share_url(base: &str, token: &str) -> String {
    format!("{}/p/{}", base.trim_end_matches('/'), token)
}

/// Extract the token from `/p/:token`, a full share URL, or either with a
/// query string or fragment attached.
pub fn parse_share_path(path: &str) -> Option<String> {
    let path = path.trim();
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |i| &rest[i..]),
        None => path,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["p", token] => Some((*token).to_string()),
        _ => None,
    }
}

/// The proposal shared under `token`, if sharing is currently public.
pub fn get_proposal_by_token<'a>(proposals: &'a [Proposal], token: &str) -> Option<&'a Proposal> {
    if token.is_empty() {
        return None;
    }
    proposals.iter().find(|p| {
        let sharing = &p.settings.sharing;
        sharing.public && sharing.token.as_deref() == Some(token)
    })
}

/// The public link of `proposal`, or [`ShareError::NotPublic`].
pub fn public_url(proposal: &Proposal, base: &str) -> Result<String, ShareError> {
    let sharing = &proposal.settings.sharing;
    match sharing.token.as_deref() {
        Some(token) if sharing.public && !token.is_empty() => Ok(share_url(base, token)),
        _ => Err(ShareError::NotPublic(proposal.id.clone())),
    }
}

/// An SVG QR code for the share dialog.
pub fn share_qr_svg(url: &str) -> Result<String, ShareError> {
    let code = QrCode::new(url.as_bytes())?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}
