//! Label Matcher Library
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//!
//! Reconciles shipping-label files dropped into an object store against the
//! open orders of a warehouse-management system (WMS).
//!
//! # Overview
//!
//! - **Batch Decoder** ([`batch`]): queue envelopes to label descriptors
//! - **WMS Client** ([`wms`]): session login and the submit/poll/fetch report protocol
//! - **Object Store Adapter** ([`storage`]): list/read/move/delete over key prefixes
//! - **Reconciler** ([`reconcile`]): one batch end to end
//! - **Notifier** ([`notify`]): aggregated operator alerts
//! - **Operator primitives** ([`folders`]): retry, archive and clear labels
//!
//! # Storage layout
//!
//! ```text
//! incoming/  --match-->  processed/  --printed-->  printed/
//!     \
//!      `--no match / failure-->  errors/  --retry-->  incoming/
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use label_matcher::{
//!     batch::DeliveryBatch,
//!     config::Config,
//!     notify::{LogAlertSink, Notifier},
//!     reconcile::Reconciler,
//!     storage::S3ObjectStore,
//!     wms::WmsClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let reconciler = Reconciler::new(
//!         Arc::new(S3ObjectStore::new(&config.storage).await),
//!         Arc::new(WmsClient::new(config.wms.clone())?),
//!         Notifier::new(Arc::new(LogAlertSink)),
//!     );
//!     let batch = DeliveryBatch::from_event_json(r#"{"Records":[]}"#)?;
//!     let summary = reconciler.process(&batch).await?;
//!     println!("{}", serde_json::to_string(&summary)?);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod commands;
pub mod config;
pub mod error;
pub mod folders;
pub mod notify;
pub mod reconcile;
pub mod storage;
pub mod wms;

pub use error::ReconcileError;

use clap::{Parser, Subcommand};
use label_common::Folder;
use std::path::PathBuf;

/// Label Matcher - reconcile shipping labels against WMS open orders
#[derive(Parser, Debug)]
#[command(name = "label-matcher")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile one delivery batch and print the JSON summary
    Process {
        /// Queue event JSON (defaults to stdin)
        #[arg(short, long)]
        batch: Option<PathBuf>,
    },

    /// List labels in a folder
    List {
        /// incoming, processed, errors or printed
        folder: Folder,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Move labels from errors/ back to incoming/
    Retry {
        /// Object key under errors/
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        key: Option<String>,

        /// Retry everything in errors/
        #[arg(long)]
        all: bool,
    },

    /// Archive processed labels into printed/
    MarkPrinted {
        /// Object keys under processed/
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Delete every label in printed/ or errors/
    Clear {
        /// printed or errors
        folder: Folder,
    },

    /// Find labels in a folder by order id
    Select {
        folder: Folder,

        /// Comma or newline separated order ids
        order_ids: String,
    },
}
