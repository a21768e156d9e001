//! Read-side HTML handling for chat bodies.
//!
//! Bodies are stored as submitted. Before a body leaves the service it goes
//! through [`sanitize_chat_html`] and then [`rewrite_upload_urls`], which
//! points local upload links at the secure file endpoint.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

const ALLOWED_TAGS: &[&str] = &[
    "a", "img", "b", "strong", "i", "em", "u", "br", "p", "ul", "ol", "li", "span", "div",
];

const UPLOAD_PREFIXES: &[&str] = &["assets/uploads/", "uploads/"];

/// Only chat attachments are removed along with their message.
const CHAT_UPLOAD_PREFIXES: &[&str] = &["assets/uploads/chat/", "uploads/chat/"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "avif"];

/// Schemes that never point at stored uploads.
const INERT_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:"];

static QUOTED_URL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern is valid")
});

static ANY_URL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("attribute pattern is valid")
});

static IMG_WITH_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*\bsrc\s*=").expect("img pattern is valid"));

static RESOLVE_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://localhost/").expect("base url is valid"));

fn chat_policy() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::empty();
    builder
        .add_tags(ALLOWED_TAGS)
        .add_clean_content_tags(&["script", "style"])
        .add_tag_attributes("a", &["href", "title"])
        .add_tag_attributes("img", &["src", "alt", "title", "width", "height"])
        .add_url_schemes(&["http", "https", "mailto", "data"])
        .attribute_filter(drop_data_links);
    builder
}

// data: stays allowed for inline images only
fn drop_data_links<'u>(element: &str, attribute: &str, value: &'u str) -> Option<Cow<'u, str>> {
    if element == "a" && attribute == "href" && has_scheme(value, "data:") {
        None
    } else {
        Some(Cow::Borrowed(value))
    }
}

/// Strip everything outside the chat allow-list: scripts and styles with
/// their content, event handlers, and `javascript:` URLs.
pub fn sanitize_chat_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    chat_policy().clean(html).to_string()
}

/// Whether a body shows any text once tags are removed.
pub fn has_visible_text(html: &str) -> bool {
    let mut text_only = ammonia::Builder::empty();
    text_only.add_clean_content_tags(&["script", "style"]);
    let stripped = text_only.clean(html).to_string();
    html_escape::decode_html_entities(&stripped)
        .chars()
        .any(|c| !c.is_whitespace())
}

pub fn has_embedded_image(html: &str) -> bool {
    IMG_WITH_SRC.is_match(html)
}

/// Replace upload links in `src`/`href` attributes with
/// `{secure_base}?path={relative path}`.
pub fn rewrite_upload_urls(html: &str, secure_base: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    QUOTED_URL_ATTR
        .replace_all(html, |caps: &Captures<'_>| {
            let attr = &caps[1];
            let raw = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            let decoded = html_escape::decode_html_entities(raw);
            let target = match upload_relative_path(&decoded) {
                Some(rel) => secure_url(secure_base, &rel),
                None => decoded.into_owned(),
            };
            format!("{attr}=\"{}\"", html_escape::encode_double_quoted_attribute(&target))
        })
        .into_owned()
}

pub fn secure_url(secure_base: &str, rel: &str) -> String {
    let sep = if secure_base.contains('?') { '&' } else { '?' };
    format!("{secure_base}{sep}path={}", urlencoding::encode(rel))
}

/// Chat image uploads referenced by a body, in raw or secure form, as
/// upload-relative paths. Paths that could escape the upload root are ignored.
pub fn extract_upload_paths(html: &str, secure_base: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in ANY_URL_ATTR.captures_iter(html) {
        let raw = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        let decoded = html_escape::decode_html_entities(raw);
        let candidate = secure_path_param(&decoded, secure_base).or_else(|| upload_relative_path(&decoded));
        if let Some(rel) = candidate {
            if is_stored_image_path(&rel) && !paths.contains(&rel) {
                paths.push(rel);
            }
        }
    }
    paths
}

fn has_scheme(url: &str, scheme: &str) -> bool {
    url.trim_start()
        .get(..scheme.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
}

/// Decoded URL path, resolving relative URLs against a dummy origin.
fn url_path(url: &str) -> Option<(Url, String)> {
    let joined = RESOLVE_BASE.join(url).ok()?;
    let path = urlencoding::decode(joined.path())
        .map(Cow::into_owned)
        .unwrap_or_else(|_| joined.path().to_string());
    Some((joined, path))
}

fn upload_relative_path(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || INERT_SCHEMES.iter().any(|s| has_scheme(url, s)) {
        return None;
    }
    let (_, path) = url_path(url)?;
    let path = path.replace('\\', "/");

    let trimmed = path.trim_start_matches('/');
    if UPLOAD_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return Some(trimmed.to_string());
    }
    UPLOAD_PREFIXES.iter().find_map(|prefix| {
        let needle = format!("/{prefix}");
        path.find(&needle).map(|pos| path[pos + 1..].to_string())
    })
}

fn secure_path_param(url: &str, secure_base: &str) -> Option<String> {
    if INERT_SCHEMES.iter().any(|s| has_scheme(url, s)) {
        return None;
    }
    let (joined, _) = url_path(url.trim())?;
    let secure = RESOLVE_BASE.join(secure_base).ok()?;
    if joined.path() != secure.path() {
        return None;
    }
    joined
        .query_pairs()
        .find(|(k, _)| k == "path")
        .map(|(_, v)| v.trim_start_matches('/').replace('\\', "/"))
}

fn is_stored_image_path(rel: &str) -> bool {
    if rel.is_empty() || rel.contains('\0') || rel.contains("..") {
        return false;
    }
    if !CHAT_UPLOAD_PREFIXES.iter().any(|p| rel.starts_with(p)) {
        return false;
    }
    rel.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
