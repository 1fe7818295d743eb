use clap::{Args, Parser, Subcommand};
use librunpod::{
    chat::{self, ChatCompletion},
    image::{edit::Edit, generate, generate::Generation, split_images, url_path, ImageInput},
    job::poll::Poller,
    record::{RequestLog, DEFAULT_LOG_FILE},
    Client,
};
use serde_json::{json, Value};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing_subscriber::filter::LevelFilter;

/// Submit image and text generation jobs to RunPod serverless endpoints.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    options: Options,
}

#[derive(Debug, Args)]
struct Options {
    /// Endpoint id, overriding `RUNPOD_ENDPOINT_ID`
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Milliseconds between two status queries
    #[arg(long, global = true, default_value_t = 5000)]
    interval_ms: u64,
    /// Status queries before giving up
    #[arg(long, global = true, default_value_t = 60)]
    max_attempts: u32,
    /// JSON file responses are appended to
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    log: PathBuf,
    /// More diagnostics on stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Edit images with a prompt
    Edit {
        /// Comma-separated paths, URLs or data URIs
        images: String,
        prompt: String,
    },
    /// Wait for an existing job and download its output
    Poll { id: String },
    /// Generate an image from text
    T2i {
        prompt: String,
        model: Option<String>,
    },
    /// Generate an image from reference images and text
    I2i {
        /// Comma-separated paths, URLs or data URIs, or `-` for none
        images: String,
        prompt: String,
        model: Option<String>,
    },
    /// Generate text
    Text {
        prompt: String,
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = match cli.options.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let options = &cli.options;
    let client = Client::new(None, options.endpoint.as_deref())?;
    let log = RequestLog::new(&options.log);
    let poller = Poller::new()
        .interval(Duration::from_millis(options.interval_ms))
        .max_attempts(options.max_attempts)
        .print_progress(true);

    match cli.command {
        Command::Edit { images, prompt } => {
            let images = ImageInput::load_all(split_images(&images)).await?;
            let builder = Edit::builder(prompt)?.images(images).poller(poller);
            print_json(&builder.redacted_request(&client))?;

            let edit = builder.build(&client).await?;
            println!();
            respond(&log, edit.redacted()).await?;
        }

        Command::Poll { id } => {
            let job = poller.poll_job(None, &id, &client).await?;
            println!();

            let output_file = match job.output_url() {
                Some(url) => job.download_output(poll_output_path(&id, url)).await?,
                None => None,
            };

            respond(&log, with_output_file(job.redacted(), output_file.as_deref())).await?;
        }

        Command::T2i { prompt, model } => {
            let builder = Generation::builder(prompt)?
                .model(model.unwrap_or_else(|| generate::DEFAULT_MODEL.to_string()))
                .poller(poller);
            print_json(&builder.redacted_request(&client))?;

            let generation = builder.build(&client).await?;
            respond(&log, generation.redacted()).await?;
        }

        Command::I2i {
            images,
            prompt,
            model,
        } => {
            let images = match images.as_str() {
                "-" => Vec::new(),
                images => ImageInput::load_all(split_images(images)).await?,
            };
            let builder = Generation::builder(prompt)?
                .model(model.unwrap_or_else(|| generate::DEFAULT_MODEL.to_string()))
                .images(images)
                .poller(poller);
            print_json(&builder.redacted_request(&client))?;

            let generation = builder.build(&client).await?;
            respond(&log, generation.redacted()).await?;
        }

        Command::Text { prompt, model } => {
            let model = model.unwrap_or_else(|| chat::DEFAULT_MODEL.to_string());
            let completion = ChatCompletion::new(model, prompt, &client).await?;
            println!("{}", completion.text().unwrap_or_default());
        }
    }

    return Ok(());
}

/// `output-{id}{ext}`, with the extension taken from the output URL
fn poll_output_path(id: &str, url: &str) -> PathBuf {
    let ext = match Path::new(url_path(url)).extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy()),
        None => ".jpg".to_string(),
    };
    return PathBuf::from(format!("output-{id}{ext}"));
}

/// Adds `outputFile` to a response, only when a file was saved
fn with_output_file(mut response: Value, output_file: Option<&Path>) -> Value {
    if let (Value::Object(map), Some(output_file)) = (&mut response, output_file) {
        map.insert(
            "outputFile".to_string(),
            json!(output_file.display().to_string()),
        );
    }
    return response;
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    return Ok(());
}

async fn respond(log: &RequestLog, response: Value) -> anyhow::Result<()> {
    print_json(&json!({ "response": response }))?;
    log.append(response).await?;
    return Ok(());
}
