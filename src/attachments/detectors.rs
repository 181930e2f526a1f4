use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::constants::MIN_INLINE_IMAGE_PX;
use crate::core::{
    AccessHandle, AttachmentDescriptor, AttachmentDetector, DiscoveryMethod, ElementHandle,
};
use crate::utils::looks_like_file_name;

/// Explicit download affordances: `a[download]`, attachment/download hrefs,
/// and controls labelled "Download …".
pub struct DownloadLinkDetector;

const DOWNLOAD_SELECTORS: &[&str] = &[
    "a[download]",
    r#"a[href*="attachment"]"#,
    r#"a[href*="download"]"#,
    r#"[aria-label^="Download"]"#,
];

impl AttachmentDetector for DownloadLinkDetector {
    fn name(&self) -> &'static str {
        "download-link"
    }

    fn detect(&self, document: &Html, base: Option<&Url>) -> Vec<AttachmentDescriptor> {
        let mut found = Vec::new();
        for selector_str in DOWNLOAD_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for (nth, element) in document.select(&selector).enumerate() {
                let reference = first_attr(&element, &["href", "data-url", "data-download-url"])
                    .or_else(|| descendant_href(&element));
                let name = [
                    element.value().attr("download"),
                    element.value().attr("aria-label").map(strip_download_label),
                    element.value().attr("title"),
                ]
                .into_iter()
                .flatten()
                .map(clean_label)
                .find(|candidate| looks_like_file_name(candidate))
                .or_else(|| reference.as_deref().and_then(name_from_reference))
                .or_else(|| Some(element_text(&element)).filter(|t| looks_like_file_name(t)));

                let Some(file_name) = name else {
                    continue;
                };
                found.push(AttachmentDescriptor {
                    file_name,
                    method: DiscoveryMethod::DownloadLink,
                    handle: reference
                        .as_deref()
                        .map(|r| AccessHandle::from_reference(r, base))
                        .unwrap_or(AccessHandle::Missing),
                    element: Some(ElementHandle::new(*selector_str, nth)),
                });
            }
        }
        found
    }
}

/// Provider attachment markup: Gmail `download_url` attributes and
/// attachment tiles, Outlook attachment cards, generic `data-filename`.
pub struct AttachmentElementDetector;

const ATTACHMENT_SELECTORS: &[&str] = &[
    "[download_url]",
    "div.aZo",
    r#"[data-testid="AttachmentCard"]"#,
    r#"[role="listitem"][aria-label*="ttachment"]"#,
    "[data-attachment-name]",
    "[data-filename]:not(img)",
];

impl AttachmentDetector for AttachmentElementDetector {
    fn name(&self) -> &'static str {
        "attachment-element"
    }

    fn detect(&self, document: &Html, base: Option<&Url>) -> Vec<AttachmentDescriptor> {
        let mut found = Vec::new();
        for selector_str in ATTACHMENT_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for (nth, element) in document.select(&selector).enumerate() {
                let (name, reference) = match element.value().attr("download_url") {
                    Some(spec) => match parse_gmail_download_url(spec) {
                        Some((name, url)) => (Some(name), Some(url)),
                        None => continue,
                    },
                    None => (
                        attachment_name(&element),
                        first_attr(&element, &["data-url", "data-src", "href"])
                            .or_else(|| descendant_href(&element)),
                    ),
                };
                let Some(file_name) = name else {
                    continue;
                };
                found.push(AttachmentDescriptor {
                    file_name,
                    method: DiscoveryMethod::AttachmentElement,
                    handle: reference
                        .as_deref()
                        .map(|r| AccessHandle::from_reference(r, base))
                        .unwrap_or(AccessHandle::Missing),
                    element: Some(ElementHandle::new(*selector_str, nth)),
                });
            }
        }
        found
    }
}

/// Images embedded in the message body, either as data URLs or served
/// from attachment endpoints.
pub struct InlineImageDetector;

const INLINE_IMAGE_SELECTOR: &str = "img[src]";

impl AttachmentDetector for InlineImageDetector {
    fn name(&self) -> &'static str {
        "inline-image"
    }

    fn detect(&self, document: &Html, base: Option<&Url>) -> Vec<AttachmentDescriptor> {
        let Ok(selector) = Selector::parse(INLINE_IMAGE_SELECTOR) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut unnamed = 0usize;
        for (nth, element) in document.select(&selector).enumerate() {
            let Some(src) = element.value().attr("src").map(str::trim) else {
                continue;
            };
            if is_icon_sized(&element) {
                continue;
            }
            let handle = AccessHandle::from_reference(src, base);
            let is_data = matches!(handle, AccessHandle::DataUrl(_));
            let lowered = src.to_lowercase();
            let attachment_like = lowered.contains("attachment")
                || lowered.contains("view=fimg")
                || lowered.contains("disp=inline")
                || element.value().attr("data-filename").is_some();
            if !is_data && !attachment_like {
                continue;
            }

            let declared = [
                element.value().attr("data-filename"),
                element.value().attr("alt"),
                element.value().attr("title"),
            ]
            .into_iter()
            .flatten()
            .map(clean_label)
            .find(|candidate| looks_like_file_name(candidate));
            let file_name = match declared {
                Some(name) => name,
                None if is_data => {
                    unnamed += 1;
                    format!("inline-image-{unnamed}.{}", data_url_extension(src))
                }
                None => match name_from_reference(src) {
                    Some(name) => name,
                    None => {
                        unnamed += 1;
                        format!("inline-image-{unnamed}.png")
                    }
                },
            };
            found.push(AttachmentDescriptor {
                file_name,
                method: DiscoveryMethod::InlineImage,
                handle,
                element: Some(ElementHandle::new(INLINE_IMAGE_SELECTOR, nth)),
            });
        }
        found
    }
}

fn first_attr(element: &ElementRef<'_>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| element.value().attr(name))
        .map(str::trim)
        .find(|value| {
            !value.is_empty() && !value.starts_with('#') && !value.starts_with("javascript:")
        })
        .map(str::to_string)
}

fn descendant_href(element: &ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    element
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty() && !href.starts_with('#'))
        .map(str::to_string)
}

fn attachment_name(element: &ElementRef<'_>) -> Option<String> {
    let from_attrs = [
        element.value().attr("data-filename"),
        element.value().attr("data-attachment-name"),
        element.value().attr("download"),
        element.value().attr("title"),
        element.value().attr("aria-label"),
    ]
    .into_iter()
    .flatten()
    .map(clean_label)
    .find(|candidate| looks_like_file_name(candidate));
    if from_attrs.is_some() {
        return from_attrs;
    }

    // Gmail tiles keep the name in a nested span; Outlook cards in a titled div.
    let nested = Selector::parse(".aV3, [title]").ok()?;
    element
        .select(&nested)
        .flat_map(|child| {
            [
                child.value().attr("title").map(clean_label),
                Some(element_text(&child)),
            ]
        })
        .flatten()
        .find(|candidate| looks_like_file_name(candidate))
}

/// Gmail encodes `mime:name:url` in a single attribute.
fn parse_gmail_download_url(spec: &str) -> Option<(String, String)> {
    let mut parts = spec.splitn(3, ':');
    let _mime = parts.next()?;
    let name = parts.next()?.trim();
    let url = parts.next()?.trim();
    if name.is_empty() || url.is_empty() {
        return None;
    }
    Some((name.to_string(), url.to_string()))
}

fn strip_download_label(label: &str) -> &str {
    let trimmed = label.trim();
    ["Download attachment ", "Download "]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
}

/// Outlook labels read "report.pdf, 2 MB"; keep the part before the comma
/// when it is a file name on its own.
fn clean_label(label: &str) -> String {
    let trimmed = label.trim();
    match trimmed.split_once(',') {
        Some((head, _)) if looks_like_file_name(head) => head.trim().to_string(),
        _ => trimmed.to_string(),
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn name_from_reference(reference: &str) -> Option<String> {
    if reference.trim_start().to_lowercase().starts_with("data:") {
        return None;
    }
    let path = Url::parse(reference)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| {
            reference
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        });
    let segment = path.rsplit('/').next()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded).filter(|name| looks_like_file_name(name))
}

fn data_url_extension(src: &str) -> String {
    let mime = src
        .get(5..)
        .and_then(|rest| rest.split([';', ',']).next())
        .unwrap_or_default()
        .to_ascii_lowercase();
    mime_guess::get_mime_extensions_str(&mime)
        .and_then(|exts| {
            // Prefer the conventional extension over the first alias.
            exts.iter()
                .find(|ext| matches!(**ext, "png" | "jpg" | "gif" | "webp" | "svg"))
                .or_else(|| exts.first())
        })
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

fn is_icon_sized(element: &ElementRef<'_>) -> bool {
    ["width", "height"].iter().any(|dim| {
        element
            .value()
            .attr(dim)
            .and_then(|value| value.trim().trim_end_matches("px").parse::<u32>().ok())
            .is_some_and(|px| px < MIN_INLINE_IMAGE_PX)
    })
}
