//! Package metadata retrieval from a NuGet v3 style registry.
//!
//! Only what the registry scenario needs: read the service index, find the
//! registration hive, and list the catalog entries of one package. All
//! traffic goes through the repository's [`Client`], so proxy rules and the
//! installed credential provider apply to every document fetched.

use serde::Deserialize;

use crate::{client::Client, error::Error};

/// Registration resource types, most preferred first.
///
/// The `3.4.0` and `3.6.0` hives are served gzip-encoded only, which the
/// client does not decode, so they are not listed.
const REGISTRATION_TYPES: &[&str] = &[
    "RegistrationsBaseUrl/3.0.0-rc",
    "RegistrationsBaseUrl/3.0.0-beta",
    "RegistrationsBaseUrl",
];

/// Where packages come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSource {
    url: String,
    protocol_version: u8,
}

impl PackageSource {
    /// A v3 source whose service index lives at `url`.
    pub fn new(url: impl Into<String>) -> PackageSource {
        PackageSource {
            url: url.into(),
            protocol_version: 3,
        }
    }

    /// Override the protocol version. Only `3` can be queried.
    pub fn with_protocol_version(mut self, version: u8) -> PackageSource {
        self.protocol_version = version;
        self
    }

    /// The service index URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The protocol version.
    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }
}

/// One version of a package, as listed by the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageMetadata {
    /// The package id, in the registry's casing.
    pub id: String,
    /// The full version string.
    pub version: String,
    /// The package description.
    pub description: Option<String>,
    /// The package authors, comma separated.
    pub authors: Option<String>,
    /// Whether the version is listed.
    pub listed: bool,
}

impl PackageMetadata {
    /// Returns true for SemVer pre-release versions (`1.0.0-beta`).
    pub fn is_prerelease(&self) -> bool {
        let version = self.version.split('+').next().unwrap_or_default();
        version.contains('-')
    }
}

/// A package source reached through a specific client.
#[derive(Clone, Debug)]
pub struct SourceRepository {
    source: PackageSource,
    client: Client,
}

impl SourceRepository {
    /// Query `source` using `client`.
    pub fn new(source: PackageSource, client: Client) -> SourceRepository {
        SourceRepository { source, client }
    }

    /// The package source.
    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    /// Fetch every version of `package_id`.
    ///
    /// Pre-release and unlisted versions are dropped unless asked for. Any
    /// non-success response, including a proxy's `407`, is returned as an
    /// error carrying its status.
    pub async fn metadata(
        &self,
        package_id: &str,
        include_prerelease: bool,
        include_unlisted: bool,
    ) -> crate::Result<Vec<PackageMetadata>> {
        if self.source.protocol_version != 3 {
            return Err(Error::builder(format!(
                "unsupported package source protocol version {}",
                self.source.protocol_version
            )));
        }

        let base = self.registration_base().await?;
        let url = format!("{base}{}/index.json", package_id.to_lowercase());
        log::debug!("fetching registration index {url}");

        let index: RegistrationIndex = self.fetch(&url).await?;

        let mut metadata = Vec::new();
        for page in index.items {
            let leaves = match page.items {
                Some(items) => items,
                None => {
                    log::trace!("fetching registration page {}", page.id);
                    self.fetch::<RegistrationPage>(&page.id).await?.items
                }
            };

            metadata.extend(
                leaves
                    .into_iter()
                    .map(|leaf| leaf.catalog_entry.into_metadata()),
            );
        }

        metadata.retain(|m| {
            (include_prerelease || !m.is_prerelease()) && (include_unlisted || m.listed)
        });

        Ok(metadata)
    }

    async fn registration_base(&self) -> crate::Result<String> {
        let index: ServiceIndex = self.fetch(&self.source.url).await?;

        REGISTRATION_TYPES
            .iter()
            .find_map(|ty| {
                index
                    .resources
                    .iter()
                    .find(|r| r.kind.matches(ty))
                    .map(|r| r.id.clone())
            })
            .map(|base| {
                if base.ends_with('/') {
                    base
                } else {
                    format!("{base}/")
                }
            })
            .ok_or_else(|| Error::decode("service index has no registration resource"))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> crate::Result<T> {
        self.client.get(url).await?.error_for_status()?.json()
    }
}

#[derive(Deserialize)]
struct ServiceIndex {
    #[serde(default)]
    resources: Vec<ServiceResource>,
}

#[derive(Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    kind: ResourceType,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResourceType {
    One(String),
    Many(Vec<String>),
}

impl ResourceType {
    fn matches(&self, ty: &str) -> bool {
        match self {
            ResourceType::One(kind) => kind == ty,
            ResourceType::Many(kinds) => kinds.iter().any(|kind| kind == ty),
        }
    }
}

#[derive(Deserialize)]
struct RegistrationIndex {
    #[serde(default)]
    items: Vec<RegistrationPageRef>,
}

#[derive(Deserialize)]
struct RegistrationPageRef {
    #[serde(rename = "@id")]
    id: String,
    items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Deserialize)]
struct RegistrationPage {
    #[serde(default)]
    items: Vec<RegistrationLeaf>,
}

#[derive(Deserialize)]
struct RegistrationLeaf {
    #[serde(rename = "catalogEntry")]
    catalog_entry: CatalogEntry,
}

#[derive(Deserialize)]
struct CatalogEntry {
    id: String,
    version: String,
    description: Option<String>,
    authors: Option<Authors>,
    listed: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Authors {
    One(String),
    Many(Vec<String>),
}

impl CatalogEntry {
    fn into_metadata(self) -> PackageMetadata {
        PackageMetadata {
            id: self.id,
            version: self.version,
            description: self.description,
            authors: self.authors.map(|authors| match authors {
                Authors::One(author) => author,
                Authors::Many(authors) => authors.join(", "),
            }),
            // absent means listed
            listed: self.listed.unwrap_or(true),
        }
    }
}
