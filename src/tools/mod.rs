//! Table-driven MessengerFlow tools.
//!
//! Each tool is one [`ToolSpec`]: a closed set of actions, each mapped to a
//! single REST call by a [`Route`]. [`dispatch`] validates the arguments,
//! builds the call and wraps the outcome in the tool result envelope. It
//! never fails: every error becomes an `isError` result.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use tracing::{debug, warn};

use crate::{
    arguments::Arguments,
    client::{ApiClient, ApiError, RequestOptions},
    schema::{CallToolResult, Tool, ToolInputSchema},
};

mod accounts;
mod analytics;
mod campaigns;
mod inbox;
mod leads;

pub use accounts::ACCOUNTS;
pub use analytics::ANALYTICS;
pub use campaigns::CAMPAIGNS;
pub use inbox::INBOX;
pub use leads::LEADS;

/// Every tool, in listing order.
pub static TOOLS: [&ToolSpec; 5] = [&CAMPAIGNS, &ACCOUNTS, &LEADS, &INBOX, &ANALYTICS];

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().copied().find(|tool| tool.name == name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Patch,
    Delete,
}

impl Verb {
    fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }
}

/// An optional input field of a tool, besides `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    AccountId,
    Data,
    Query,
    Search,
    Limit,
    Offset,
    Period,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::AccountId => "account_id",
            Field::Data => "data",
            Field::Query => "query",
            Field::Search => "search",
            Field::Limit => "limit",
            Field::Offset => "offset",
            Field::Period => "period",
        }
    }

    fn json_schema(self, description: &str) -> Value {
        match self {
            Field::Data => json!({
                "type": "object",
                "additionalProperties": {},
                "description": description,
            }),
            Field::Limit | Field::Offset => json!({"type": "number", "description": description}),
            _ => json!({"type": "string", "description": description}),
        }
    }
}

/// Where a body field takes its value from.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    Id,
    AccountId,
    Flag(bool),
}

#[derive(Debug, Clone, Copy)]
pub enum Body {
    None,
    /// The `data` argument, passed through as is.
    Data,
    /// Fields built from the arguments. With `merge_data`, the keys of
    /// `data` are laid over them.
    Fields {
        fields: &'static [(&'static str, Source)],
        merge_data: bool,
    },
}

/// One action: the checks to run and the REST call to make.
#[derive(Debug)]
pub struct Route {
    pub action: &'static str,
    pub verb: Verb,
    /// Request path; `{id}` is replaced with the `id` argument.
    pub path: &'static str,
    /// Fields that must be present and non-empty, with the error to report.
    pub require: &'static [(Field, &'static str)],
    /// Query parameter name and the field it is read from.
    pub query: &'static [(&'static str, Field)],
    pub body: Body,
}

impl Route {
    pub const fn new(action: &'static str, verb: Verb, path: &'static str) -> Self {
        Self {
            action,
            verb,
            path,
            require: &[],
            query: &[],
            body: Body::None,
        }
    }

    pub const fn require(mut self, require: &'static [(Field, &'static str)]) -> Self {
        self.require = require;
        self
    }

    pub const fn query(mut self, query: &'static [(&'static str, Field)]) -> Self {
        self.query = query;
        self
    }

    pub const fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Optional input fields with their descriptions, in schema order.
    pub fields: &'static [(Field, &'static str)],
    pub routes: &'static [Route],
}

impl ToolSpec {
    pub fn actions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.routes.iter().map(|route| route.action)
    }

    pub fn route(&self, action: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.action == action)
    }

    /// The tool's listing entry, with `action` as a required enum.
    pub fn to_tool(&self) -> Tool {
        let mut schema = ToolInputSchema::default()
            .with_property(
                "action",
                json!({
                    "type": "string",
                    "enum": self.actions().collect::<Vec<_>>(),
                    "description": "Action to perform",
                }),
            )
            .with_required("action");
        for (field, description) in self.fields {
            schema = schema.with_property(field.name(), field.json_schema(description));
        }
        Tool::new(self.name, schema).with_description(self.description)
    }
}

/// Failure of a single tool call, reported through the envelope.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Missing(&'static str),

    #[error("Invalid action \"{action}\". Expected one of: {expected}")]
    InvalidAction { action: String, expected: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("Invalid id \"{0}\"")]
    InvalidId(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The union of every tool's inputs. Fields a tool does not declare are
/// never read by its routes.
#[derive(Debug, Default, Deserialize)]
struct ToolArgs {
    action: String,
    id: Option<String>,
    account_id: Option<String>,
    data: Option<Map<String, Value>>,
    query: Option<String>,
    search: Option<String>,
    limit: Option<Number>,
    offset: Option<Number>,
    period: Option<String>,
}

impl ToolArgs {
    /// String form of a field, as sent in paths and query strings.
    fn text(&self, field: Field) -> Option<String> {
        match field {
            Field::Id => self.id.clone(),
            Field::AccountId => self.account_id.clone(),
            Field::Query => self.query.clone(),
            Field::Search => self.search.clone(),
            Field::Period => self.period.clone(),
            Field::Limit => self.limit.as_ref().map(Number::to_string),
            Field::Offset => self.offset.as_ref().map(Number::to_string),
            Field::Data => None,
        }
    }

    /// Required fields must be present and non-empty.
    fn has(&self, field: Field) -> bool {
        match field {
            Field::Data => self.data.is_some(),
            _ => self.text(field).is_some_and(|v| !v.is_empty()),
        }
    }
}

/// Run one tool call and wrap the outcome in the result envelope.
pub async fn dispatch(client: &ApiClient, tool: &ToolSpec, arguments: Option<Arguments>) -> CallToolResult {
    match execute(client, tool, arguments).await {
        Ok(value) => success(&value),
        Err(e) => {
            warn!(tool = tool.name, "Tool call failed: {}", e);
            failure(&e.to_string())
        }
    }
}

async fn execute(client: &ApiClient, tool: &ToolSpec, arguments: Option<Arguments>) -> Result<Value, ToolError> {
    let args: ToolArgs = arguments.unwrap_or_default().deserialize()?;
    let route = tool.route(&args.action).ok_or_else(|| ToolError::InvalidAction {
        action: args.action.clone(),
        expected: tool.actions().collect::<Vec<_>>().join(", "),
    })?;

    for (field, message) in route.require {
        if !args.has(*field) {
            return Err(ToolError::Missing(*message));
        }
    }

    let path = match args.text(Field::Id) {
        Some(id) => interpolate(route.path, &id)?,
        None => route.path.to_string(),
    };

    let mut options = RequestOptions::new(route.verb.method());
    for (param, field) in route.query {
        if let Some(value) = args.text(*field) {
            options = options.with_param(*param, value);
        }
    }
    if let Some(body) = build_body(route.body, &args) {
        options = options.with_body(body);
    }

    debug!(tool = tool.name, action = route.action, %path, "Dispatching tool action");
    Ok(client.call(&path, options).await?)
}

/// Place `id` in the path as a single encoded segment. Dot segments are
/// refused since URL normalization would resolve them.
fn interpolate(path: &str, id: &str) -> Result<String, ToolError> {
    if matches!(id, "." | "..") {
        return Err(ToolError::InvalidId(id.to_string()));
    }
    Ok(path.replace("{id}", &urlencoding::encode(id)))
}

fn build_body(body: Body, args: &ToolArgs) -> Option<Value> {
    match body {
        Body::None => None,
        Body::Data => args.data.clone().map(Value::Object),
        Body::Fields { fields, merge_data } => {
            let mut object = Map::new();
            for (name, source) in fields {
                let value = match source {
                    Source::Id => args.id.clone().map(Value::String),
                    Source::AccountId => args.account_id.clone().map(Value::String),
                    Source::Flag(flag) => Some(Value::Bool(*flag)),
                };
                if let Some(value) = value {
                    object.insert((*name).to_string(), value);
                }
            }
            if merge_data {
                if let Some(data) = &args.data {
                    object.extend(data.clone());
                }
            }
            Some(Value::Object(object))
        }
    }
}

/// Success envelope: the result as pretty-printed JSON text.
pub fn success(value: &Value) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => CallToolResult::new().with_text_content(text),
        Err(e) => failure(&e.to_string()),
    }
}

/// Error envelope: `Error: {message}`, flagged as an error.
pub fn failure(message: &str) -> CallToolResult {
    CallToolResult::new()
        .with_text_content(format!("Error: {message}"))
        .is_error(true)
}
