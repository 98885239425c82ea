//! Gemini Talk command line
//!
//! ```text
//! gemini-talk chat "Describe this clip" --attach clip.mp4 --speak
//! gemini-talk upload notes.md talk.mp3
//! gemini-talk status <file-id>
//! gemini-talk models
//! gemini-talk migrate
//! ```

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gemini_talk::api::chat::{ChatClient, ChatRequest, GenerationConfig};
use gemini_talk::api::files::{FileService, GeminiFiles};
use gemini_talk::api::Endpoint;
use gemini_talk::speech::{AudioOutput, FileOutput, HttpSynthesizer, SpeechQueue, SpeechTicket};
use gemini_talk::storage::history::{load_model_list, save_model_list, MessageHistory};
use gemini_talk::storage::kv::JsonStore;
use gemini_talk::storage::migration::migrate_legacy;
use gemini_talk::storage::settings::{load_settings, Settings, TalkMode};
use gemini_talk::stream::{speech_text, text_stream, SegmentMode, StreamHandler};
use gemini_talk::types::config::ClientConfig;
use gemini_talk::types::file::{format_size, FileState};
use gemini_talk::types::message::{Message, Part, Role};
use gemini_talk::upload::{
    AttachmentStore, AttachmentUploader, StatusPoller, UploadFile, UploadManager,
};

#[derive(Parser, Debug)]
#[command(name = "gemini-talk", version, about = "Gemini chat with file uploads and spoken replies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a prompt and stream the reply
    Chat {
        prompt: String,

        /// Model id, e.g. gemini-1.5-pro-latest
        #[arg(long)]
        model: Option<String>,

        /// Upload files and attach them to the prompt
        #[arg(long = "attach", value_name = "PATH")]
        attach: Vec<PathBuf>,

        /// Read the reply aloud
        #[arg(long)]
        speak: bool,

        /// Save spoken statements as audio files here instead of playing them
        #[arg(long, value_name = "DIR")]
        audio_dir: Option<PathBuf>,

        /// Forget the stored conversation first
        #[arg(long)]
        new: bool,
    },
    /// Upload files and wait until they are processed
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the processing state of an uploaded file
    Status { file_id: String },
    /// List available Gemini models
    Models,
    /// Move data stored by older versions to the current layout
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so replies can be piped
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,gemini_talk=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let store = JsonStore::open_default().context("Failed to open data store")?;

    if let Command::Migrate = cli.command {
        let migrated = migrate_legacy(&store)?;
        println!("Migrated {} legacy entries", migrated);
        return Ok(());
    }
    let migrated = migrate_legacy(&store)?;
    if migrated > 0 {
        info!("Migrated {} legacy entries", migrated);
    }

    let settings = load_settings(&store);
    let config = ClientConfig::from_settings(&settings).with_env();
    let endpoint = Endpoint::from_config(&config)?;

    match cli.command {
        Command::Chat {
            prompt,
            model,
            attach,
            speak,
            audio_dir,
            new,
        } => {
            let options = ChatOptions {
                prompt,
                model,
                attach,
                speak,
                audio_dir,
                new,
            };
            chat(&store, &settings, &config, endpoint, options).await
        }
        Command::Upload { paths } => upload(&config, endpoint, paths).await,
        Command::Status { file_id } => status(endpoint, &file_id).await,
        Command::Models => models(&store, endpoint).await,
        Command::Migrate => Ok(()),
    }
}

struct ChatOptions {
    prompt: String,
    model: Option<String>,
    attach: Vec<PathBuf>,
    speak: bool,
    audio_dir: Option<PathBuf>,
    new: bool,
}

/// Prints the reply as it arrives and queues statements for speech
struct ReplyPrinter {
    reply: String,
    speech: Option<SpeechQueue>,
    tickets: Vec<SpeechTicket>,
}

impl StreamHandler for ReplyPrinter {
    fn on_text(&mut self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
        self.reply.push_str(text);
    }

    fn on_statement(&mut self, statement: &str) {
        if let Some(queue) = &self.speech {
            let text = speech_text(statement);
            if !text.trim().is_empty() {
                self.tickets.push(queue.enqueue(text));
            }
        }
    }

    fn on_finish(&mut self) {
        println!();
    }
}

fn segment_mode(settings: &Settings) -> SegmentMode {
    match settings.talk_mode {
        TalkMode::Voice => {
            let locale = if settings.tts_lang.is_empty() {
                &settings.lang
            } else {
                &settings.tts_lang
            };
            SegmentMode::sentence(locale.clone())
        }
        TalkMode::Chat => SegmentMode::Paragraph,
    }
}

fn audio_output(audio_dir: Option<PathBuf>, extension: &str) -> Result<Arc<dyn AudioOutput>> {
    if let Some(dir) = audio_dir {
        return Ok(Arc::new(FileOutput::new(dir, extension)));
    }
    #[cfg(feature = "playback")]
    {
        Ok(Arc::new(gemini_talk::speech::RodioOutput::new()))
    }
    #[cfg(not(feature = "playback"))]
    {
        anyhow::bail!("Built without the `playback` feature; pass --audio-dir to save speech instead")
    }
}

fn attachment_uploader(config: &ClientConfig, endpoint: Endpoint) -> Result<AttachmentUploader> {
    let service: Arc<dyn FileService> = Arc::new(GeminiFiles::new(endpoint)?);
    Ok(AttachmentUploader::new(
        UploadManager::new(service.clone()),
        StatusPoller::new(service),
        AttachmentStore::new(),
    )
    .with_upload_limit(config.upload_limit))
}

async fn load_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Cannot upload {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

/// The last `limit` messages; 0 keeps all of them
fn recent_messages(messages: &[Message], limit: usize) -> &[Message] {
    if limit > 0 && messages.len() > limit {
        &messages[messages.len() - limit..]
    } else {
        messages
    }
}

/// Run `work` unless `signal` fires first; `None` when interrupted
async fn unless_interrupted<T>(work: impl Future<Output = T>, signal: impl Future) -> Option<T> {
    tokio::select! {
        output = work => Some(output),
        _ = signal => None,
    }
}

async fn chat(
    store: &JsonStore,
    settings: &Settings,
    config: &ClientConfig,
    endpoint: Endpoint,
    options: ChatOptions,
) -> Result<()> {
    let mut parts = Vec::new();
    if !options.attach.is_empty() {
        let uploader = attachment_uploader(config, endpoint.clone())?;
        let files = load_files(&options.attach).await?;
        uploader
            .upload_all(files, &|message: &str| eprintln!("{}", message))
            .await;
        parts.extend(uploader.store().parts());
        if parts.len() < options.attach.len() {
            warn!("Only {} of {} attachments are usable", parts.len(), options.attach.len());
        }
    }
    parts.push(Part::text(options.prompt));

    let mut history = MessageHistory::load(store.clone());
    if options.new {
        history.clear();
    }
    history.add(Message::new(Role::User, parts));

    let recent = recent_messages(history.messages(), settings.max_history_length as usize);
    let system_instruction = settings.system_instruction.trim();
    let request = ChatRequest {
        model: options.model.unwrap_or_else(|| settings.model.clone()),
        messages: recent.to_vec(),
        system_instruction: (!system_instruction.is_empty()).then(|| system_instruction.to_string()),
        generation_config: GenerationConfig::from_settings(settings),
    };

    let speech = if options.speak {
        let synth = HttpSynthesizer::from_config(config);
        let output = audio_output(options.audio_dir, synth.response_format())?;
        Some(SpeechQueue::new(Arc::new(synth), output))
    } else {
        None
    };
    let mut printer = ReplyPrinter {
        reply: String::new(),
        speech: speech.clone(),
        tickets: Vec::new(),
    };

    let client = ChatClient::new(endpoint)?;
    let mode = segment_mode(settings);
    let reply = async {
        match client.stream_chat(&request).await {
            Ok(stream) => text_stream(stream, mode, &mut printer).await,
            Err(e) => Err(e),
        }
    };
    let mut interrupted = false;
    let streamed = match unless_interrupted(reply, tokio::signal::ctrl_c()).await {
        Some(result) => result,
        None => {
            if let Some(queue) = &speech {
                queue.stop();
            }
            println!();
            info!("Reply interrupted");
            interrupted = true;
            Ok(())
        }
    };
    if !printer.reply.is_empty() {
        history.add(Message::text(Role::Model, printer.reply.clone()));
    }
    history.save()?;
    streamed?;
    if interrupted {
        return Ok(());
    }

    if let Some(queue) = speech {
        let tickets = std::mem::take(&mut printer.tickets);
        let spoken = async {
            for ticket in tickets {
                if let Err(e) = ticket.wait().await {
                    warn!("Statement not spoken: {}", e);
                }
            }
        };
        if unless_interrupted(spoken, tokio::signal::ctrl_c()).await.is_none() {
            queue.stop();
            info!("Speech stopped");
        }
    }
    Ok(())
}

async fn upload(config: &ClientConfig, endpoint: Endpoint, paths: Vec<PathBuf>) -> Result<()> {
    let uploader = attachment_uploader(config, endpoint)?;
    let files = load_files(&paths).await?;
    let results = uploader
        .upload_all(files, &|message: &str| eprintln!("{}", message))
        .await;

    let mut failed = 0;
    for result in results {
        match result {
            Ok(info) => match (&info.status, &info.metadata) {
                (FileState::Active, Some(meta)) => println!(
                    "{}  {}  {}  {}",
                    meta.file_id(),
                    info.name,
                    format_size(info.size),
                    meta.uri
                ),
                _ => {
                    failed += 1;
                    println!("{}  {:?}", info.name, info.status);
                }
            },
            Err(_) => failed += 1,
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} files did not upload", failed, paths.len());
    }
    Ok(())
}

async fn status(endpoint: Endpoint, file_id: &str) -> Result<()> {
    let files = GeminiFiles::new(endpoint)?;
    let id = file_id.strip_prefix("files/").unwrap_or(file_id);
    let metadata = files.get_metadata(id).await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn models(store: &JsonStore, endpoint: Endpoint) -> Result<()> {
    let client = ChatClient::new(endpoint)?;
    let models = match client.list_models().await {
        Ok(models) => {
            save_model_list(store, &models)?;
            models
        }
        Err(e) => {
            let cached = load_model_list(store);
            if cached.is_empty() {
                return Err(e.into());
            }
            warn!("Failed to fetch models ({}), showing cached list", e);
            cached
        }
    };
    for model in &models {
        println!("{:<40} {}", model.id(), model.display_name);
    }
    Ok(())
}
