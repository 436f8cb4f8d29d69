use crate::resolve::{resolve_url, BaseUrl};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const CATALOG_ITEM_URL: &str = "https://bioimage.io/#/?id=";
const TYPE_KEYWORD_PREFIX: &str = "bioimage.io:";

/// Characters left verbatim by `encodeURIComponent`-style escaping.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Resource-description document for a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rdf {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub description: String,
    pub license: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub covers: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    #[serde(default)]
    pub affiliation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedIdentifier {
    pub relation: String,
    pub identifier: String,
    pub resource_type: String,
    pub scheme: String,
}

/// Metadata block of a deposition record, shaped by the archival REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositionMetadata {
    pub title: String,
    pub description: String,
    pub access_right: String,
    pub license: String,
    pub upload_type: String,
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub communities: Vec<serde_json::Value>,
    pub publication_date: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub related_identifiers: Vec<RelatedIdentifier>,
    #[serde(default)]
    pub doi: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositionFile {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositionLinks {
    pub html: String,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// A versioned upload record in the archival repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposition {
    pub metadata: DepositionMetadata,
    #[serde(default)]
    pub files: Vec<DepositionFile>,
    pub links: DepositionLinks,
}

fn valid_license_id(license: &str) -> bool {
    static LICENSE_RE: OnceLock<Regex> = OnceLock::new();
    LICENSE_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.+-]*$").unwrap())
        .is_match(license)
}

fn strip_html_tags(html: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE
        .get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
        .replace_all(html, "")
        .into_owned()
}

/// Build the deposition metadata for publishing a catalog entry.
///
/// Cover images and the documentation link are resolved against the entry's
/// base URL; catalog cross-links are recorded as percent-encoded catalog
/// item URLs.
pub fn rdf_to_metadata(rdf: &Rdf, base_url: &str) -> Result<DepositionMetadata> {
    if !valid_license_id(&rdf.license) {
        bail!(
            "Invalid license '{}', the license identifier must be one from the SPDX license list (https://spdx.org/licenses/)",
            rdf.license
        );
    }
    let base = BaseUrl::parse(base_url);

    let mut related_identifiers = Vec::new();
    for cover in &rdf.covers {
        let identifier = if cover.starts_with("http") {
            cover.clone()
        } else {
            resolve_url(cover, &base)
        };
        related_identifiers.push(RelatedIdentifier {
            relation: "hasPart".to_string(),
            identifier,
            resource_type: "image-figure".to_string(),
            scheme: "url".to_string(),
        });
    }
    for link in &rdf.links {
        related_identifiers.push(RelatedIdentifier {
            relation: "references".to_string(),
            identifier: format!(
                "{}{}",
                CATALOG_ITEM_URL,
                utf8_percent_encode(link, COMPONENT)
            ),
            resource_type: "other".to_string(),
            scheme: "url".to_string(),
        });
    }
    if let Some(documentation) = &rdf.documentation {
        let identifier = if documentation.starts_with("http") {
            documentation.clone()
        } else {
            resolve_url(documentation, &base)
        };
        related_identifiers.push(RelatedIdentifier {
            relation: "isDocumentedBy".to_string(),
            identifier,
            resource_type: "publication-technicalnote".to_string(),
            scheme: "url".to_string(),
        });
    }

    let creators = rdf
        .authors
        .iter()
        .map(|author| Creator {
            name: author.clone(),
            affiliation: String::new(),
        })
        .collect();

    let mut keywords = vec![
        "bioimage.io".to_string(),
        format!("{}{}", TYPE_KEYWORD_PREFIX, rdf.resource_type),
    ];
    keywords.extend(rdf.tags.iter().cloned());

    Ok(DepositionMetadata {
        title: rdf.name.clone(),
        description: format!("<p>{}</p>", rdf.description),
        access_right: "open".to_string(),
        license: rdf.license.clone(),
        upload_type: "other".to_string(),
        creators,
        communities: Vec::new(),
        publication_date: Utc::now().format("%Y-%m-%d").to_string(),
        keywords,
        notes: "Uploaded via BioImage.IO website (https://bioimage.io)".to_string(),
        related_identifiers,
        doi: None,
    })
}

/// Recover the catalog resource description from a published deposition.
///
/// Model records must carry a `model.yaml` file; every record must carry a
/// `bioimage.io:<type>` keyword.
pub fn deposition_to_rdf(deposition: &Deposition) -> Result<Rdf> {
    let metadata = &deposition.metadata;

    let resource_type = metadata
        .keywords
        .iter()
        .find_map(|k| k.strip_prefix(TYPE_KEYWORD_PREFIX))
        .ok_or_else(|| {
            anyhow!(
                "record '{}' does not carry a '{}<TYPE>' keyword",
                metadata.title,
                TYPE_KEYWORD_PREFIX
            )
        })?
        .to_string();

    if resource_type == "model" && !deposition.files.iter().any(|f| f.key == "model.yaml") {
        bail!("model record '{}' has no model.yaml file", metadata.title);
    }

    let mut covers = Vec::new();
    let mut links = Vec::new();
    let mut documentation = None;
    for idf in &metadata.related_identifiers {
        if idf.scheme != "url" {
            continue;
        }
        if idf.relation == "hasPart" && idf.resource_type == "image-figure" {
            covers.push(idf.identifier.clone());
        } else if idf.relation == "references" && idf.identifier.starts_with(CATALOG_ITEM_URL) {
            let encoded = &idf.identifier[CATALOG_ITEM_URL.len()..];
            let decoded = percent_decode_str(encoded)
                .decode_utf8()
                .with_context(|| format!("invalid catalog link '{}'", idf.identifier))?;
            links.push(decoded.into_owned());
        } else if idf.relation == "isDocumentedBy" {
            documentation = Some(idf.identifier.clone());
        }
    }

    let tags = metadata
        .keywords
        .iter()
        .filter(|k| k.as_str() != "bioimage.io" && !k.starts_with(TYPE_KEYWORD_PREFIX))
        .cloned()
        .collect();

    Ok(Rdf {
        id: metadata.doi.clone().unwrap_or_default(),
        name: metadata.title.clone(),
        resource_type,
        description: strip_html_tags(&metadata.description),
        license: metadata.license.clone(),
        authors: metadata.creators.iter().map(|c| c.name.clone()).collect(),
        tags,
        covers,
        links,
        documentation,
        source: Some(deposition.links.html.clone()),
    })
}

/// Query URL for listing catalog records of a given type.
///
/// `resource_type` of `None` (or `"all"`) lists every catalog record.
pub fn records_query_url(
    base_url: &str,
    page: usize,
    resource_type: Option<&str>,
    keywords: &[String],
) -> String {
    let base = base_url.trim_end_matches('/');
    let type_keyword = match resource_type {
        None | Some("all") => "bioimage.io".to_string(),
        Some(t) => format!("{}{}", TYPE_KEYWORD_PREFIX, t),
    };
    let mut url = format!(
        "{}/api/records/?&all_versions&page={}&size=20&keywords={}",
        base, page, type_keyword
    );
    for keyword in keywords {
        url.push_str("&keywords=");
        url.push_str(&utf8_percent_encode(keyword, COMPONENT).to_string());
    }
    url
}
