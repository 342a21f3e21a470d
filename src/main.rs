use std::process;

use folio::{
    application::{
        error::AppError,
        render::{
            Document, MountedDocument, RenderPipelineConfig, configure_render_service,
            render_service,
        },
    },
    config::{self, BlocksArgs, OutputFormat, RenderArgs},
    infra::{
        error::InfraError,
        input::{read_source, write_stdout},
        telemetry,
    },
    presentation::html,
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;
    configure_render_service(RenderPipelineConfig::from(&settings.render))
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    match cli_args.command {
        config::Command::Render(args) => run_render(&settings, args).await,
        config::Command::Blocks(args) => run_blocks(&settings, args).await,
    }
}

async fn run_render(settings: &config::Settings, args: RenderArgs) -> Result<(), AppError> {
    if args.standalone && args.format != OutputFormat::Html {
        return Err(AppError::validation("--standalone requires --format html"));
    }

    let source = read_source(&args.input).await?;
    let document =
        Document::new(source).with_structural_comments(settings.document.show_structural_comments);

    let mounted = MountedDocument::default();
    let tree = mounted.render_resolved(&document).await;

    info!(
        target = "folio::render",
        nodes = tree.nodes.len(),
        diagrams = tree.diagrams().len(),
        cached_artifacts = mounted.pipeline().cache().len(),
        "Rendered document"
    );

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&tree).map_err(InfraError::from)?,
        OutputFormat::Html if args.standalone => {
            html::write_document(&tree, &document_title(&args))
        }
        OutputFormat::Html => html::write_tree(&tree),
    };

    write_stdout(&output).await?;
    Ok(())
}

async fn run_blocks(settings: &config::Settings, args: BlocksArgs) -> Result<(), AppError> {
    let source = read_source(&args.input).await?;
    let document =
        Document::new(source).with_structural_comments(settings.document.show_structural_comments);

    let blocks = render_service()
        .blocks(&document)
        .map_err(|err| AppError::validation(err.to_string()))?;
    let output = serde_json::to_string_pretty(&blocks).map_err(InfraError::from)?;

    write_stdout(&output).await?;
    Ok(())
}

fn document_title(args: &RenderArgs) -> String {
    args.input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| *stem != "-")
        .unwrap_or("folio")
        .to_string()
}
