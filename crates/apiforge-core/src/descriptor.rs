//! Resource descriptors: the unit of indexing and search.
//!
//! A descriptor is produced by the (external) sync pipeline for every REST
//! operation and every schema found in a normalized OpenAPI document. The
//! payload is a tagged union keyed by `type`, so consumers always match on
//! [`ResourceData`] instead of probing for fields.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Namespace for name-based descriptor ids.
const DESCRIPTOR_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_9b4d_4e7a_8c15_d02b_77e4_a931);

/// Path segment that groups schema descriptors under a source.
pub const COMPONENTS_SEGMENT: &str = "components";

/// Discriminant of a descriptor payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A REST operation.
    Rest,
    /// A data schema.
    Schema,
}

impl ResourceType {
    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Schema => "schema",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "schema" => Ok(Self::Schema),
            other => Err(format!("unknown resource type '{other}'")),
        }
    }
}

/// HTTP method of a REST operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl HttpMethod {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unknown HTTP method '{other}'")),
        }
    }
}

/// Where an operation variable is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VariableLocation {
    /// Templated path segment.
    Path,
    /// Query string parameter.
    Query,
    /// Request header.
    Header,
    /// Cookie.
    Cookie,
}

/// A path/query/header/cookie variable of a REST operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Parameter name.
    #[schema(example = "id")]
    pub name: String,

    /// Where the parameter is carried.
    #[serde(rename = "in")]
    pub location: VariableLocation,

    /// Referenced schema name, when the parameter uses a named schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
}

/// Payload of a REST operation descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestData {
    /// HTTP method.
    pub method: HttpMethod,

    /// URL path template, e.g. `/api/users/{id}`.
    #[schema(example = "/api/users/{id}")]
    pub url: String,

    /// Operation identifier in camelCase.
    #[schema(example = "getUser")]
    pub operation_id: String,

    /// Tags the operation is grouped under.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Path/query/header/cookie variables.
    #[serde(default)]
    pub variables: Vec<Variable>,

    /// Schema name of the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,

    /// Schema name of the success response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Request content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Response content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,

    /// Short summary.
    #[serde(default)]
    pub summary: String,

    /// Long-form description.
    #[serde(default)]
    pub description: String,

    /// Response examples keyed however the source document keyed them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub examples: Option<serde_json::Value>,

    /// Error responses: status code to schema name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl RestData {
    /// Names of every schema this operation references, sorted and unique.
    #[must_use]
    pub fn data_types(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        names.extend(self.request_body.iter().cloned());
        names.extend(self.response.iter().cloned());
        names.extend(self.variables.iter().filter_map(|v| v.schema.clone()));
        names.extend(self.errors.values().cloned());
        names.into_iter().collect()
    }
}

/// Payload of a schema descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaData {
    /// Schema name.
    #[schema(example = "User")]
    pub name: String,

    /// JSON-Schema-shaped definition.
    #[schema(value_type = Object)]
    pub schema: serde_json::Value,
}

/// Descriptor payload, tagged by the descriptor `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ResourceData {
    /// REST operation payload.
    Rest(RestData),
    /// Schema payload.
    Schema(SchemaData),
}

impl ResourceData {
    /// The discriminant of this payload.
    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        match self {
            Self::Rest(_) => ResourceType::Rest,
            Self::Schema(_) => ResourceType::Schema,
        }
    }
}

/// The canonical record for one REST operation or one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "0d7c5c0e-6a53-5c43-9a0c-4b1f0b6a4f6e",
    "name": "getUser",
    "source": "petstore",
    "path": "petstore/users/getUser",
    "type": "rest",
    "data": {
        "method": "GET",
        "url": "/api/users/{id}",
        "operationId": "getUser",
        "tags": ["users"],
        "variables": [{"name": "id", "in": "path", "required": true}],
        "response": "User",
        "summary": "Get a user",
        "description": ""
    },
    "lastAccessed": 1_736_899_200_000_i64
}))]
pub struct ResourceDescriptor {
    /// Stable unique id.
    pub id: String,

    /// Display name: operation name or schema name.
    pub name: String,

    /// Originating source identifier.
    pub source: String,

    /// Grouping path (`source/tags/operation` or `source/components/Name`).
    pub path: String,

    /// Type-tagged payload.
    #[serde(flatten)]
    pub data: ResourceData,

    /// Last access time in epoch milliseconds; `None` means never accessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<i64>,
}

impl ResourceDescriptor {
    /// Build a REST descriptor, deriving its id and grouping path.
    #[must_use]
    pub fn rest(source: impl Into<String>, data: RestData) -> Self {
        let source = source.into();
        let id = rest_descriptor_id(&source, &data);
        let mut segments = vec![source.clone()];
        segments.extend(data.tags.iter().cloned());
        segments.push(data.operation_id.clone());

        Self {
            id,
            name: data.operation_id.clone(),
            path: segments.join("/"),
            source,
            data: ResourceData::Rest(data),
            last_accessed: None,
        }
    }

    /// Build a schema descriptor, deriving its id and grouping path.
    #[must_use]
    pub fn schema(source: impl Into<String>, data: SchemaData) -> Self {
        let source = source.into();
        let id = schema_descriptor_id(&source, &data.name);

        Self {
            id,
            name: data.name.clone(),
            path: format!("{source}/{COMPONENTS_SEGMENT}/{}", data.name),
            source,
            data: ResourceData::Schema(data),
            last_accessed: None,
        }
    }

    /// The payload discriminant.
    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        self.data.resource_type()
    }

    /// REST payload, if this is a REST descriptor.
    #[must_use]
    pub const fn as_rest(&self) -> Option<&RestData> {
        match &self.data {
            ResourceData::Rest(rest) => Some(rest),
            ResourceData::Schema(_) => None,
        }
    }

    /// Tag path used as the `package` filter value. Empty for schemas.
    #[must_use]
    pub fn package(&self) -> String {
        match &self.data {
            ResourceData::Rest(rest) => rest.tags.join("/"),
            ResourceData::Schema(_) => String::new(),
        }
    }

    /// Controller grouping of a REST descriptor: its path minus the operation.
    #[must_use]
    pub fn controller(&self) -> Option<&str> {
        match &self.data {
            ResourceData::Rest(_) => self.path.rsplit_once('/').map(|(head, _)| head),
            ResourceData::Schema(_) => None,
        }
    }

    /// Schema names referenced by this descriptor.
    #[must_use]
    pub fn data_types(&self) -> Vec<String> {
        match &self.data {
            ResourceData::Rest(rest) => rest.data_types(),
            ResourceData::Schema(_) => Vec::new(),
        }
    }
}

/// Stable id of a REST operation.
///
/// Identity is source, method, path template, operation id and the
/// content/response types.
#[must_use]
pub fn rest_descriptor_id(source: &str, data: &RestData) -> String {
    let key = format!(
        "rest\u{1f}{source}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        data.method,
        data.url,
        data.operation_id,
        data.content_type.as_deref().unwrap_or_default(),
        data.response_type.as_deref().unwrap_or_default(),
    );
    Uuid::new_v5(&DESCRIPTOR_NAMESPACE, key.as_bytes()).to_string()
}

/// Stable id of a schema: source and schema name.
#[must_use]
pub fn schema_descriptor_id(source: &str, name: &str) -> String {
    let key = format!("schema\u{1f}{source}\u{1f}{name}");
    Uuid::new_v5(&DESCRIPTOR_NAMESPACE, key.as_bytes()).to_string()
}
