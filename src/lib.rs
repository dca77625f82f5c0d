//! docsplit - split multi-document PDFs into logical documents and label them.
//!
//! A scanned binder of construction paperwork is usually one PDF holding
//! many documents: emails, payment applications, change orders, RFIs. docsplit
//! takes per-page text and layout observations, finds the pages where a new
//! document starts, and classifies each resulting page range. User
//! corrections are remembered and feed back into future confidence scores.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docsplit::{
//!     DataDir, FeedbackStore, LayoutInfo, PageObservation, Splitter,
//!     SplitterConfig,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let feedback = Arc::new(FeedbackStore::open(data_dir.feedback_file()));
//! let splitter = Splitter::new(&SplitterConfig::default(), feedback);
//!
//! let pages = vec![
//!     PageObservation::from_extracted(
//!         0,
//!         "From: a@b.com\nSubject: pour".into(),
//!         LayoutInfo::default(),
//!     ),
//!     PageObservation::from_extracted(
//!         1,
//!         "APPLICATION FOR PAYMENT".into(),
//!         LayoutInfo::default(),
//!     ),
//! ];
//! for doc in splitter.split(&pages) {
//!     println!(
//!         "pages {}-{}: {} ({:.2})",
//!         doc.segment.start_page,
//!         doc.segment.end_page,
//!         doc.classification.document_type(),
//!         doc.classification.confidence()
//!     );
//! }
//! ```

pub mod boundary;
pub mod classification;
pub mod classifier;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod feedback;
pub mod label;
pub mod page;
pub mod patterns;
pub mod pipeline;
pub mod segment;

pub use boundary::{BoundaryConfig, BoundaryDetector, BoundarySet};
pub use classification::ClassificationResult;
pub use classifier::{ClassifierConfig, DocumentClassifier, ExternalClassifier};
pub use config::SplitterConfig;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use feedback::FeedbackStore;
pub use label::{DocumentType, Method};
pub use page::{LayoutInfo, PageObservation, TextBlock};
pub use patterns::{PatternKind, PatternSet, PatternStore};
pub use pipeline::{SplitDocument, Splitter};
pub use segment::{DocumentSegment, get_document_sections};
