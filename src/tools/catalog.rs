use schemars::gen::{SchemaGenerator, SchemaSettings};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;

use crate::scene::{CameraSpec, EnvironmentSpec};

use super::params::{CreateLightParams, CreateShapeParams, RemoveParams, UpdateLightParams, UpdateShapeParams};
use super::ToolKind;

/// One operation as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the argument object. Fully inlined, no `$ref`.
    pub parameters: Value,
}

pub(crate) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

fn generator() -> SchemaGenerator {
    SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
            s.option_add_null_type = false;
            s.option_nullable = false;
        })
        .into_generator()
}

pub(crate) fn schema_value<T: JsonSchema>() -> Value {
    let root = generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| empty_object_schema());
    strip_annotations(&mut value);
    value
}

/// Drop keys providers reject or don't need. Property names are left alone.
fn strip_annotations(node: &mut Value) {
    match node {
        Value::Object(map) => {
            for key in ["title", "default", "format", "definitions", "$schema"] {
                map.remove(key);
            }
            for (key, child) in map.iter_mut() {
                if key == "properties" {
                    if let Value::Object(props) = child {
                        props.values_mut().for_each(strip_annotations);
                    }
                } else {
                    strip_annotations(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_annotations),
        _ => {}
    }
}

/// Set the `required` list of the schema node at `pointer`.
fn require(schema: &mut Value, pointer: &str, fields: &[&str]) {
    if let Some(Value::Object(node)) = schema.pointer_mut(pointer) {
        node.insert("required".to_string(), serde_json::json!(fields));
    }
}

fn parameters(kind: ToolKind) -> Value {
    match kind {
        ToolKind::CreateShape => {
            let mut schema = schema_value::<CreateShapeParams>();
            require(&mut schema, "", &["shapes"]);
            require(&mut schema, "/properties/shapes/items", &["id", "type", "properties"]);
            require(&mut schema, "/properties/shapes/items/properties/material", &["kind"]);
            schema
        }
        ToolKind::UpdateShape => {
            let mut schema = schema_value::<UpdateShapeParams>();
            require(&mut schema, "", &["id", "updates"]);
            require(&mut schema, "/properties/updates/properties/material", &["kind"]);
            schema
        }
        ToolKind::CreateLight => {
            let mut schema = schema_value::<CreateLightParams>();
            require(&mut schema, "", &["lights"]);
            require(&mut schema, "/properties/lights/items", &["id", "type", "properties"]);
            schema
        }
        ToolKind::UpdateLight => {
            let mut schema = schema_value::<UpdateLightParams>();
            require(&mut schema, "", &["id", "updates"]);
            schema
        }
        ToolKind::RemoveShape | ToolKind::RemoveLight => {
            let mut schema = schema_value::<RemoveParams>();
            require(&mut schema, "", &["id"]);
            schema
        }
        ToolKind::SetCamera => {
            let mut schema = schema_value::<CameraSpec>();
            require(&mut schema, "", &["center", "look_at"]);
            schema
        }
        ToolKind::SetEnvironmentLighting => {
            let mut schema = schema_value::<EnvironmentSpec>();
            require(&mut schema, "", &["kind"]);
            schema
        }
        ToolKind::RenderScene | ToolKind::GetSceneState => empty_object_schema(),
    }
}

/// Declarations for every tool, in [`ToolKind::all`] order.
pub fn tool_declarations() -> Vec<ToolDeclaration> {
    ToolKind::all()
        .iter()
        .map(|kind| ToolDeclaration {
            name: kind.name(),
            description: kind.description(),
            parameters: parameters(*kind),
        })
        .collect()
}
