//! Turns natural-language requests into validated scene mutations through an
//! LLM tool-calling loop.
//!
//! The [`agent::SceneAgent`] drives the loop, [`scene::SceneModel`] owns and
//! validates the scene, [`tools`] maps raw tool calls to typed requests, and
//! [`llm`] abstracts the model provider.

pub mod agent;
pub mod audit;
pub mod cancel;
pub mod conversation;
pub mod error;
pub mod events;
pub mod lenient;
pub mod llm;
pub mod render;
pub mod scene;
pub mod settings;
pub mod tools;
pub mod util;
