use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxgate::integration::{parse_deadline, IntegrationConfig, RespondResult, VoiceConversation};
use voxgate::speech::{EngineFactory, Transcriber, TranscriptionResult};
use voxgate::VoxError;

#[derive(Parser)]
#[command(name = "voxgate", version, about = "Speech transcription and bounded synthesis")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding ggml Whisper models
    #[arg(long, global = true, default_value = "models/whisper")]
    whisper_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe an audio file
    Transcribe {
        #[arg(long)]
        audio: PathBuf,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Synthesize text to a WAV file regardless of the voice output toggle
    Synthesize {
        #[arg(long)]
        text: String,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        model_dir: Option<PathBuf>,
        #[arg(long)]
        speed: Option<f32>,
        /// Per-attempt deadline in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Clone the reference voice instead of the Cantonese instruction mode
        #[arg(long)]
        no_cantonese: bool,
    },
    /// Respond to text with speech when voice output is on
    Respond {
        #[arg(long)]
        text: String,
        #[arg(long)]
        speed: Option<f32>,
        /// Speak even when voice output is off
        #[arg(long)]
        force: bool,
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Transcribe audio, then speak a response
    Turn {
        #[arg(long)]
        audio: PathBuf,
        #[arg(long)]
        response: String,
    },
    /// Inspect or change the voice output toggle
    Voice {
        #[arg(value_enum)]
        action: VoiceAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VoiceAction {
    On,
    Off,
    Toggle,
    Status,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxgate=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => IntegrationConfig::load(path).map_err(report)?,
        None => IntegrationConfig::default(),
    };

    match cli.command {
        Command::Transcribe {
            audio,
            language,
            model,
        } => {
            if let Some(model) = model {
                config.stt.model = model;
            }
            let conversation = build(config, &cli.whisper_dir)?;
            let result = conversation.transcribe(&audio, language.as_deref());
            print_transcription(&result);
            if !result.success {
                bail!("transcription failed");
            }
        }
        Command::Synthesize {
            text,
            output,
            model_dir,
            speed,
            timeout,
            no_cantonese,
        } => {
            if let Some(dir) = model_dir {
                config.tts.model_dir = dir;
            }
            if let Some(secs) = timeout {
                config.tts.timeout_secs = secs;
            }
            if no_cantonese {
                config.tts.cantonese = false;
            }
            config.validate().map_err(report)?;

            let conversation = build(config, &cli.whisper_dir)?;
            let result = conversation.synthesize_response(&text, output, speed, true);

            println!("success:     {}", result.success);
            if let Some(path) = &result.output_file {
                println!("output:      {}", path.display());
                println!("duration:    {:.2}s @ {} Hz", result.duration, result.sample_rate);
            }
            println!("retries:     {}", result.retry_count);
            if let Some(error) = &result.error {
                println!("error:       {}", error);
                bail!("synthesis failed");
            }
        }
        Command::Respond {
            text,
            speed,
            force,
            timeout,
        } => {
            let timeout = timeout.map(parse_deadline).transpose().map_err(report)?;
            let conversation = build(config, &cli.whisper_dir)?;
            let result = conversation.respond_speech(&text, speed, force, timeout);
            print_response(&result);
            if !result.success {
                bail!("response synthesis failed");
            }
        }
        Command::Turn { audio, response } => {
            let conversation = build(config, &cli.whisper_dir)?;
            let turn = conversation.conversation_turn(&audio, &response);
            print_transcription(&turn.transcription);
            if let Some(response) = &turn.response {
                println!();
                print_response(response);
            }
            if !turn.success {
                bail!("conversation turn failed");
            }
        }
        Command::Voice { action } => {
            let conversation = build(config, &cli.whisper_dir)?;
            match action {
                VoiceAction::On => {
                    conversation.enable_voice_output();
                }
                VoiceAction::Off => {
                    conversation.disable_voice_output();
                }
                VoiceAction::Toggle => {
                    conversation.toggle_voice_output();
                }
                VoiceAction::Status => {}
            }
            println!("{}", conversation.voice_output_status());
        }
    }

    Ok(())
}

fn build(config: IntegrationConfig, whisper_dir: &Path) -> Result<VoiceConversation> {
    info!("Starting voxgate");
    let conversation = VoiceConversation::new(config, transcriber(whisper_dir), engines())
        .map_err(report)
        .context("failed to set up the conversation")?;
    Ok(conversation)
}

/// Print the user-facing explanation of `err` and hand it on to anyhow
fn report(err: VoxError) -> anyhow::Error {
    eprintln!("{}", err.user_message());
    if err.is_recoverable() {
        eprintln!("This is usually transient; trying again may help.");
    }
    err.into()
}

#[cfg(feature = "whisper")]
fn transcriber(whisper_dir: &Path) -> Arc<dyn Transcriber> {
    Arc::new(voxgate::speech::WhisperTranscriber::new(whisper_dir))
}

#[cfg(not(feature = "whisper"))]
fn transcriber(_whisper_dir: &Path) -> Arc<dyn Transcriber> {
    Arc::new(backends::Unavailable)
}

#[cfg(feature = "sherpa")]
fn engines() -> Arc<dyn EngineFactory> {
    Arc::new(voxgate::speech::SherpaEngineFactory::default())
}

#[cfg(not(feature = "sherpa"))]
fn engines() -> Arc<dyn EngineFactory> {
    Arc::new(backends::Unavailable)
}

/// Stand-ins reporting which cargo feature a command needs
#[cfg(any(not(feature = "whisper"), not(feature = "sherpa")))]
mod backends {
    use std::path::Path;
    use std::sync::Arc;
    use voxgate::speech::{
        EngineFactory, RawTranscript, SpeechEngine, Transcriber, TranscriptionRequest,
    };
    use voxgate::VoxError;

    pub struct Unavailable;

    impl Transcriber for Unavailable {
        fn transcribe(&self, _request: &TranscriptionRequest) -> voxgate::Result<RawTranscript> {
            Err(VoxError::EngineUnavailable(
                "no transcription engine built in; rebuild with `--features whisper`".into(),
            ))
        }
    }

    impl EngineFactory for Unavailable {
        fn build(&self, _model_dir: &Path) -> voxgate::Result<Arc<dyn SpeechEngine>> {
            Err(VoxError::EngineUnavailable(
                "no synthesis engine built in; rebuild with `--features sherpa`".into(),
            ))
        }
    }
}

fn print_transcription(result: &TranscriptionResult) {
    println!("success:     {}", result.success);
    if let Some(error) = &result.error {
        println!("error:       {}", error.message);
        return;
    }
    println!("text:        {}", result.text);
    println!("language:    {}", result.language);
    println!("duration:    {:.2}s", result.duration);
    println!("model:       {}", result.model);
    if result.control_action.is_command() {
        println!("command:     {:?}", result.control_action);
    }
    println!("voice:       {}", if result.voice_enabled { "on" } else { "off" });
    for segment in &result.segments {
        println!("  [{:>6.2} - {:>6.2}] {}", segment.start, segment.end, segment.text);
    }
}

fn print_response(result: &RespondResult) {
    println!("outcome:     {:?}", result.outcome);
    println!("text:        {}", result.text);
    if result.text_truncated {
        println!("spoken:      {}", result.spoken_text);
    }
    if let Some(path) = &result.output_file {
        println!("output:      {}", path.display());
        println!("duration:    {:.2}s", result.duration);
    }
    if let Some(message) = &result.message {
        println!("message:     {}", message);
    }
    println!("voice:       {}", if result.voice_enabled { "on" } else { "off" });
}
