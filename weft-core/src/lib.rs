//! Weft Core
//!
//! This crate provides a dependency-tracking reactivity engine. It implements:
//!
//! - Reactive primitives (observables, computeds, autoruns)
//! - Automatic dependency discovery from reads
//! - Incremental subscription maintenance between evaluation cycles
//! - Asynchronous computed values on tokio
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, tracking contexts and the engine
//! - `graph`: Node identity, the node trait and the registry
//! - `config`: Engine configuration
//! - `error`: Error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//!
//! use weft_core::reactive::{Computed, Engine, Observable};
//!
//! let engine = Engine::new();
//!
//! // Create an observable
//! let count = Observable::new(&engine, "count", 1);
//!
//! // Create a derived value
//! let doubled = Computed::new(&engine, "doubled", {
//!     let count = count.clone();
//!     move |_| count.read() * 2
//! });
//!
//! // React to it
//! let seen = Arc::new(AtomicI32::new(0));
//! let disposer = engine
//!     .autorun({
//!         let doubled = doubled.clone();
//!         let seen = seen.clone();
//!         move || seen.store(doubled.read().unwrap_or_default(), Ordering::SeqCst)
//!     })
//!     .unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//!
//! // Update the observable
//! count.write(5);
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//!
//! disposer.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::EngineConfig;
pub use error::{Error, Result};
