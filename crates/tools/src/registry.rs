//! ToolRegistry — named, versioned tool specs with a callable handler.
//!
//! Registration is last-write-wins; lookup misses raise `UnknownTool`.
//! The registry performs no input validation itself — each handler is
//! responsible for raising a clear error on malformed params.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use forge_domain::error::{Error, Result};
use forge_domain::execution::{ExecutionContext, ToolResult};
use forge_domain::value::ParamValue;
use serde_json::Value;

/// A tool's callable. Implementations own their own input validation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: ParamValue, ctx: &ExecutionContext) -> Result<ToolResult>;
}

/// Registry entry: the handler plus the metadata describing it.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Tags like "read"/"write"/"net", advisory only.
    pub effects: Vec<String>,
    pub in_schema: Value,
    pub out_schema: Value,
    /// Scope key consulted by the RateLimiter, if this tool makes
    /// provider calls of its own.
    pub rate_key: Option<String>,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("description", &self.description)
            .field("effects", &self.effects)
            .field("in_schema", &self.in_schema)
            .field("out_schema", &self.out_schema)
            .field("rate_key", &self.rate_key)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        effects: Vec<&str>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            version: "1".into(),
            description: description.into(),
            effects: effects.into_iter().map(str::to_string).collect(),
            in_schema: Value::Null,
            out_schema: Value::Null,
            rate_key: None,
            handler,
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any prior registration under the same name.
    pub fn register(&mut self, spec: ToolSpec) {
        self.tools.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Result<&ToolSpec> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get_all_tools(&self) -> Vec<&ToolSpec> {
        self.tools.values().collect()
    }

    pub async fn invoke(
        &self,
        name: &str,
        params: ParamValue,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult> {
        let spec = self.get(name)?;
        spec.handler.call(params, ctx).await
    }
}
