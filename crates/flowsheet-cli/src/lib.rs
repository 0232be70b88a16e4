//! CLI logic for the flowsheet resolver.
//!
//! Reads fragment files, resolves them through [`flowsheet::ModelBuilder`]
//! and reports the outcome.

pub mod error_adapter;

mod args;
mod config;

pub use args::Args;

use log::{info, warn};

use flowsheet::{FlowsheetError, ModelBuilder, Session, fragment};

/// Run the flowsheet CLI application
///
/// Reads every fragment in argument order, resolves the model, logs a
/// per-field summary and optionally writes the merged model.
///
/// Returns the [`Session`] so the caller can report its diagnostics. A
/// session can be returned even when it is invalid; check
/// [`Session::is_valid`].
///
/// # Arguments
///
/// * `args` - Command-line arguments
///
/// # Errors
///
/// Returns `FlowsheetError` for:
/// - File I/O errors
/// - Fragment decoding errors
/// - Configuration loading errors
/// - Fatal resolution errors
pub fn run(args: &Args) -> Result<Session, FlowsheetError> {
    info!(fragments = args.fragments.len(); "Processing fragments");

    // Load configuration
    let mut app_config = config::load_config(args.config.as_ref())?;
    if args.lenient {
        app_config = app_config.with_lenient(true);
    }

    // Read fragments in layer order
    let fragments = args
        .fragments
        .iter()
        .map(fragment::read_fragment)
        .collect::<Result<Vec<_>, _>>()?;

    let builder = ModelBuilder::new(app_config);
    let session = builder.build(fragments)?;

    for (field, graph) in session.resolution().graphs() {
        let active = session
            .resolution()
            .selection(field)
            .map_or(0, |selection| selection.active_processes().len());
        info!(
            field:% = field,
            active_processes = active,
            endpoints = graph.node_count(),
            streams = graph.edge_count(),
            components = graph.components().len();
            "Field resolved"
        );
    }

    if let Some(path) = &args.save_merged {
        fragment::write_fragment(path, &session.resolution().model().to_element())?;
        info!(output_file = path; "Merged model written");
    }

    if !session.is_valid() {
        warn!(diagnostics = session.diagnostics().len(); "Model is invalid");
    }

    Ok(session)
}
