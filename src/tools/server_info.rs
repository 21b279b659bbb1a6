//! `serverInfo`: build and runtime information about the deployment.

use bson::{doc, Document};
use serde_json::{Map, Value as JsonValue};

use crate::convert::{document_to_json, get_optional_bool};
use crate::error::Result;
use crate::schema;
use crate::tools::{Context, ToolDef};

const BUILD_FIELDS: [&str; 9] = [
    "version",
    "gitVersion",
    "modules",
    "allocator",
    "javascriptEngine",
    "bits",
    "debug",
    "maxBsonObjectSize",
    "versionArray",
];

const STATUS_FIELDS: [&str; 8] = [
    "host",
    "uptime",
    "localTime",
    "connections",
    "network",
    "mem",
    "opcounters",
    "storageEngine",
];

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "serverInfo",
        "Get MongoDB server version and build details plus the connection mode. \
         Set `includeDebugInfo` for runtime status (uptime, connections, memory, opcounters).",
        schema!(object {
            optional: { "includeDebugInfo": boolean }
        }),
    )
}

/// Validated `serverInfo` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfoRequest {
    /// Also fetch serverStatus.
    pub include_debug_info: bool,
}

impl ServerInfoRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>) -> Result<Self> {
        Ok(Self {
            include_debug_info: get_optional_bool(args, "includeDebugInfo")?.unwrap_or(false),
        })
    }
}

fn pick(source: &Document, fields: &[&str]) -> Document {
    fields
        .iter()
        .filter_map(|f| source.get(*f).map(|v| (f.to_string(), v.clone())))
        .collect()
}

/// Run serverInfo.
pub async fn run(ctx: &Context<'_>, req: ServerInfoRequest) -> Result<JsonValue> {
    let build = ctx.call(ctx.gateway().command(doc! { "buildInfo": 1 })).await?;
    let mut info = pick(&build, &BUILD_FIELDS);

    if req.include_debug_info {
        let status = ctx
            .call(ctx.gateway().command(doc! { "serverStatus": 1 }))
            .await?;
        info.insert("debugInfo", pick(&status, &STATUS_FIELDS));
    }

    info.insert(
        "connectionInfo",
        doc! {
            "readOnlyMode": ctx.session.is_read_only(),
            "readPreference": ctx.session.read_preference(),
        },
    );
    Ok(document_to_json(info))
}
