//! # Audio Guide
//!
//! Backend for user-authored museum audio guides.
//!
//! Guides are markdown documents persisted through a storage agent and
//! cached in an in-process store. The HTTP API segments, translates and
//! narrates them through external completion and speech vendors.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │   HTTP   │──▶│ GuideLibrary │──▶│ StorageAgent  │
//! │  (axum)  │   │  GuideStore  │   │ memory / http │
//! └────┬─────┘   └──────────────┘   └───────────────┘
//!      │
//!      ├──▶ CompletionClient   (segment, translate)
//!      ├──▶ SpeechSynthesizer  (text-to-speech)
//!      └──▶ ImageGenerator     (illustrations)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! audioguide serve                                  # start the HTTP server
//! audioguide init-db --creator 0xabc --file-id 12   # write a guide index file
//! audioguide inspect-db                             # show what storage holds
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`markdown`] | Title split and narration chunking |
//! | [`store`] | In-process guide store |
//! | [`storage`] | Storage agent abstraction |
//! | [`library`] | Guide ingestion and recovery |
//! | [`completion`] | Chat-completion client abstraction |
//! | [`segment`] | Guide segmentation |
//! | [`translate`] | Guide translation |
//! | [`speech`] | Text-to-speech |
//! | [`image`] | Illustration generation |
//! | [`agent`] | Guide assistant deployments |
//! | [`logs`] | Log ring and request logging |
//! | [`server`] | HTTP server |

pub mod agent;
pub mod completion;
pub mod config;
pub mod image;
pub mod library;
pub mod logs;
pub mod markdown;
pub mod models;
pub mod segment;
pub mod server;
pub mod speech;
pub mod storage;
pub mod store;
pub mod translate;
