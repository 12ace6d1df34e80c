//! SharePoint document library backend
//!
//! Talks to the SharePoint REST API with a caller-supplied bearer token.
//! Identifiers are server-relative URLs such as
//! `/sites/Legal/Shared Documents/Inbox/contract.pdf`. Identifiers outside
//! the site (e.g. `Finance/Invoices/AWS`) are relative to the configured
//! document library.

use super::{
    base_name, join_path, parent_of, FolderColoring, PermissionCapability, PermissionEntry,
    StorageBackend, StorageError,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;

const ACCEPT_NOMETADATA: &str = "application/json;odata=nometadata";

/// `moveto` flag: overwrite. Collisions are resolved by the executor before
/// the move is issued.
const MOVE_FLAG_OVERWRITE: u8 = 1;

/// Folders every library carries that are never sort targets
const SYSTEM_FOLDERS: &[&str] = &["Forms"];

pub const DEFAULT_LIBRARY: &str = "Shared Documents";

#[derive(Deserialize)]
struct ODataList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ODataValue<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpItem {
    name: String,
    server_relative_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpRoleAssignment {
    principal_id: i64,
    #[serde(default)]
    role_definition_bindings: Vec<SpRoleDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpRoleDefinition {
    id: i64,
}

pub struct DocumentLibraryBackend {
    http: Client,
    site_url: String,
    /// Server-relative path of the site, e.g. `/sites/Legal`
    site_path: String,
    /// Server-relative root of the document library relative ids live in
    library: String,
    access_token: String,
}

impl DocumentLibraryBackend {
    pub fn new(site_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let site_url = site_url.into().trim_end_matches('/').to_string();
        let site_path = site_path_of(&site_url);
        let library = normalize(&join_path(&site_path, DEFAULT_LIBRARY));
        Self {
            http: Client::new(),
            site_url,
            site_path,
            library,
            access_token: access_token.into(),
        }
    }

    /// Use another document library: a library name (`Contracts`) or a
    /// server-relative URL (`/sites/Legal/Contracts`)
    pub fn with_library(mut self, library: &str) -> Self {
        let library = library.trim();
        if !library.trim_matches('/').is_empty() {
            self.library = if library.starts_with('/') {
                normalize(library)
            } else {
                normalize(&join_path(&self.site_path, library))
            };
        }
        self
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Server-relative URL of the document library
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Server-relative URL for any identifier this backend is handed
    fn resolve(&self, id: &str) -> String {
        resolve_in(&self.site_path, &self.library, id)
    }

    fn api(&self, path: &str) -> String {
        format!("{}/_api/{}", self.site_url, path)
    }

    async fn send(&self, method: Method, url: &str) -> Result<reqwest::Response, StorageError> {
        self.http
            .request(method, url)
            .bearer_auth(&self.access_token)
            .header("Accept", ACCEPT_NOMETADATA)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Request failed: {}", e)))
    }

    /// Send and map non-success statuses to storage errors
    async fn call(
        &self,
        method: Method,
        url: &str,
        subject: &str,
    ) -> Result<reqwest::Response, StorageError> {
        let response = self.send(method, url).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => StorageError::NotFound(subject.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StorageError::PermissionDenied(format!("{}: {}", subject, status))
            }
            _ => StorageError::Backend(format!("SharePoint error ({}) for {}: {}", status, subject, body)),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        subject: &str,
    ) -> Result<T, StorageError> {
        self.call(Method::GET, url, subject)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to parse response for {}: {}", subject, e)))
    }

    async fn folder_items(&self, folder: &str, collection: &str) -> Result<Vec<SpItem>, StorageError> {
        let folder = self.resolve(folder);
        let url = self.api(&format!(
            "web/GetFolderByServerRelativeUrl('{}')/{}",
            odata_literal(&folder),
            collection
        ));
        let list: ODataList<SpItem> = self.get_json(&url, &folder).await?;
        Ok(list.value)
    }

    async fn folder_exists(&self, folder: &str) -> Result<bool, StorageError> {
        let url = self.api(&format!(
            "web/GetFolderByServerRelativeUrl('{}')/Exists",
            odata_literal(folder)
        ));
        match self.get_json::<ODataValue<bool>>(&url, folder).await {
            Ok(v) => Ok(v.value),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn file_exists(&self, file: &str) -> Result<bool, StorageError> {
        let url = self.api(&format!(
            "web/GetFileByServerRelativeUrl('{}')/Exists",
            odata_literal(file)
        ));
        match self.get_json::<ODataValue<bool>>(&url, file).await {
            Ok(v) => Ok(v.value),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Ensure a leading slash and no trailing slash
fn normalize(id: &str) -> String {
    format!("/{}", id.trim_matches('/'))
}

/// Path component of a site URL (`https://host/sites/x` -> `/sites/x`)
fn site_path_of(site_url: &str) -> String {
    let without_scheme = site_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(site_url);
    match without_scheme.find('/') {
        Some(idx) => normalize(&without_scheme[idx..]),
        None => String::new(),
    }
}

/// Quote a server-relative URL for use inside an OData string literal
fn odata_literal(path: &str) -> String {
    path.replace('%', "%25")
        .replace('#', "%23")
        .replace('?', "%3F")
        .replace('\'', "''")
}

/// `path` below `prefix` ("" when equal), or None when not under it
fn relative_to<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if path == prefix {
        return Some("");
    }
    path.strip_prefix(prefix)?.strip_prefix('/')
}

/// Server-relative URL of `id`. URLs inside the site are kept; anything
/// else is taken relative to `library`.
fn resolve_in(site_path: &str, library: &str, id: &str) -> String {
    let normalized = normalize(id);
    let in_site = !site_path.is_empty() && relative_to(&normalized, site_path).is_some();
    if in_site || relative_to(&normalized, library).is_some() {
        normalized
    } else {
        normalize(&join_path(library, id.trim_matches('/')))
    }
}

/// Folders to ensure for the resolved `folder`, shortest first
///
/// The library (or, for another library in the site, the site path plus
/// its library segment) already exists and is skipped.
fn folder_chain(site_path: &str, library: &str, folder: &str) -> Vec<String> {
    let (mut current, relative) = match relative_to(folder, library) {
        Some(relative) => (library.to_string(), relative),
        None => {
            let relative = relative_to(folder, site_path).unwrap_or(folder).trim_matches('/');
            match relative.split_once('/') {
                Some((other_library, rest)) => (normalize(&join_path(site_path, other_library)), rest),
                None => return Vec::new(),
            }
        }
    };

    let mut chain = Vec::new();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        current = join_path(&current, segment);
        chain.push(current.clone());
    }
    chain
}

#[async_trait]
impl StorageBackend for DocumentLibraryBackend {
    fn name(&self) -> &'static str {
        "sharepoint"
    }

    async fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .folder_items(container, "Files")
            .await?
            .into_iter()
            .map(|f| f.server_relative_url)
            .collect())
    }

    async fn list_folders(&self, container: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .folder_items(container, "Folders")
            .await?
            .into_iter()
            .filter(|f| !SYSTEM_FOLDERS.contains(&f.name.as_str()))
            .map(|f| f.server_relative_url)
            .collect())
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let id = self.resolve(id);
        let url = self.api(&format!(
            "web/GetFileByServerRelativeUrl('{}')/$value",
            odata_literal(&id)
        ));
        let bytes = self
            .call(Method::GET, &url, &id)
            .await?
            .bytes()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to download {}: {}", id, e)))?;
        Ok(bytes.to_vec())
    }

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        let id = self.resolve(id);
        if self.file_exists(&id).await? {
            return Ok(true);
        }
        self.folder_exists(&id).await
    }

    async fn move_object(&self, source: &str, target: &str) -> Result<(), StorageError> {
        let (source, target) = (self.resolve(source), self.resolve(target));
        let url = self.api(&format!(
            "web/GetFileByServerRelativeUrl('{}')/moveto(newurl='{}',flags={})",
            odata_literal(&source),
            odata_literal(&target),
            MOVE_FLAG_OVERWRITE
        ));
        tracing::info!("[SharePoint] Moving {} -> {}", source, target);
        self.call(Method::POST, &url, &source).await?;
        Ok(())
    }

    async fn rename(&self, source: &str, new_name: &str) -> Result<String, StorageError> {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(StorageError::InvalidIdentifier(format!(
                "'{}' is not a plain file name",
                new_name
            )));
        }
        let source = self.resolve(source);
        if base_name(&source) == new_name {
            return Ok(source);
        }
        let target = join_path(parent_of(&source), new_name);
        self.move_object(&source, &target).await?;
        Ok(target)
    }

    async fn create_container(&self, path: &str) -> Result<(), StorageError> {
        let folder = self.resolve(path);
        for folder in folder_chain(&self.site_path, &self.library, &folder) {
            if self.folder_exists(&folder).await? {
                continue;
            }
            let url = self.api(&format!("web/folders/add('{}')", odata_literal(&folder)));
            self.call(Method::POST, &url, &folder).await?;
            tracing::debug!("[SharePoint] Created folder {}", folder);
        }
        Ok(())
    }

    async fn is_container(&self, id: &str) -> Result<bool, StorageError> {
        self.folder_exists(&self.resolve(id)).await
    }

    fn permissions(&self) -> Option<&dyn PermissionCapability> {
        Some(self)
    }

    fn folder_coloring(&self) -> Option<&dyn FolderColoring> {
        Some(self)
    }
}

#[async_trait]
impl PermissionCapability for DocumentLibraryBackend {
    async fn role_assignments(&self, container: &str) -> Result<Vec<PermissionEntry>, StorageError> {
        let container = self.resolve(container);
        let url = self.api(&format!(
            "web/GetFolderByServerRelativeUrl('{}')/ListItemAllFields/RoleAssignments?$expand=RoleDefinitionBindings",
            odata_literal(&container)
        ));
        let list: ODataList<SpRoleAssignment> = self.get_json(&url, &container).await?;

        Ok(list
            .value
            .into_iter()
            .map(|ra| PermissionEntry {
                principal_id: ra.principal_id,
                role_definition_ids: ra.role_definition_bindings.into_iter().map(|r| r.id).collect(),
            })
            .collect())
    }

    async fn break_inheritance(&self, object: &str) -> Result<(), StorageError> {
        let object = self.resolve(object);
        let url = self.api(&format!(
            "web/GetFileByServerRelativeUrl('{}')/ListItemAllFields/breakroleinheritance(copyRoleAssignments=false,clearSubscopes=true)",
            odata_literal(&object)
        ));
        self.call(Method::POST, &url, &object).await?;
        tracing::debug!("[SharePoint] Broke inheritance for {}", object);
        Ok(())
    }

    async fn add_role_assignment(
        &self,
        object: &str,
        principal_id: i64,
        role_definition_id: i64,
    ) -> Result<(), StorageError> {
        let object = self.resolve(object);
        let url = self.api(&format!(
            "web/GetFileByServerRelativeUrl('{}')/ListItemAllFields/roleassignments/addroleassignment(principalid={},roledefid={})",
            odata_literal(&object),
            principal_id,
            role_definition_id
        ));
        self.call(Method::POST, &url, &object).await?;
        Ok(())
    }
}

#[async_trait]
impl FolderColoring for DocumentLibraryBackend {
    async fn set_folder_color(&self, folder: &str, color: &str) -> Result<(), StorageError> {
        let folder = self.resolve(folder);
        // Color tags are small integers; anything else maps to the default (0)
        let color = color.trim().parse::<u8>().unwrap_or(0);
        let url = self.api(&format!(
            "foldercoloring/stampcolor(DecodedUrl='{}')",
            odata_literal(&folder)
        ));
        let body = serde_json::json!({
            "coloringInformation": { "ColorHex": color.to_string() }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("Accept", ACCEPT_NOMETADATA)
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Backend(format!(
                "Folder coloring failed ({}): {}",
                status, text
            )));
        }
        tracing::info!("[SharePoint] Set folder color for {} to {}", folder, color);
        Ok(())
    }
}
