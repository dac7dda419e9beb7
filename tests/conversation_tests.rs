//! Conversation pipeline tests
//!
//! These tests drive the orchestrator and the synthesis invoker with stub
//! engines and check the behavior a caller can observe.

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use voxgate::audio::read_wav;
use voxgate::integration::{IntegrationConfig, RespondOutcome, VoiceConversation};
use voxgate::output::ControlAction;
use voxgate::speech::{
    InferenceRequest, RawTranscript, SpeechChunk, SpeechEngine, SpeechSynthesizer,
    SynthesisErrorKind, Transcriber, TranscriptionRequest, TtsConfig, SAMPLE_RATE,
};
use voxgate::{Result, VoxError};

#[derive(Clone, Copy)]
enum Mode {
    Speak,
    Fail,
    Hang,
}

/// Engine stub that records every request
struct StubEngine {
    mode: Mode,
    samples: usize,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl StubEngine {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            samples: 48000,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for StubEngine {
    fn inference(&self, request: &InferenceRequest) -> Result<Vec<SpeechChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push(request.text.clone());
        match self.mode {
            Mode::Speak => Ok(vec![
                SpeechChunk::default(),
                SpeechChunk::audio(vec![0.05; self.samples], SAMPLE_RATE),
            ]),
            Mode::Fail => Err(VoxError::SynthesisError("vocoder exploded".into())),
            Mode::Hang => loop {
                thread::park();
            },
        }
    }
}

struct StubTranscriber {
    text: &'static str,
}

impl Transcriber for StubTranscriber {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<RawTranscript> {
        Ok(RawTranscript {
            text: self.text.to_string(),
            language: request.language.clone(),
            duration: 2.0,
            segments: Vec::new(),
        })
    }
}

fn tts_config(dir: &Path) -> TtsConfig {
    TtsConfig::new(dir.join("model"))
        .with_timeout(Duration::from_secs(5))
        .with_retry_backoff(Duration::from_millis(5))
}

fn conversation_with(
    dir: &Path,
    engine: Arc<StubEngine>,
    tts: TtsConfig,
    transcript: &'static str,
) -> VoiceConversation {
    let config = IntegrationConfig::default()
        .with_data_dir(dir)
        .with_tts(tts);
    let factory = move |_dir: &Path| -> Result<Arc<dyn SpeechEngine>> {
        Ok(engine.clone() as Arc<dyn SpeechEngine>)
    };
    VoiceConversation::new(
        config,
        Arc::new(StubTranscriber { text: transcript }),
        Arc::new(factory),
    )
    .unwrap()
}

fn conversation(dir: &Path, engine: Arc<StubEngine>) -> VoiceConversation {
    conversation_with(dir, engine, tts_config(dir), "你好")
}

fn audio_file(dir: &Path) -> PathBuf {
    let path = dir.join("question.wav");
    fs::write(&path, b"RIFF").unwrap();
    path
}

#[test]
fn test_respond_always_returns_text() {
    let dir = tempfile::tempdir().unwrap();

    // Disabled
    let conv = conversation(dir.path(), StubEngine::new(Mode::Speak));
    let result = conv.respond_speech("早晨", None, false, None);
    assert_eq!(result.outcome, RespondOutcome::Disabled);
    assert_eq!(result.text, "早晨");

    // Spoken
    conv.enable_voice_output();
    let result = conv.respond_speech("早晨", None, false, None);
    assert_eq!(result.outcome, RespondOutcome::Spoken);
    assert_eq!(result.text, "早晨");

    // Command
    let result = conv.respond_speech("（", None, false, None);
    assert_eq!(result.outcome, RespondOutcome::Command);
    assert!(!result.text.is_empty(), "Commands report their status as text");

    // Timed out
    let dir = tempfile::tempdir().unwrap();
    let tts = tts_config(dir.path()).with_retry_budget(1);
    let conv = conversation_with(dir.path(), StubEngine::new(Mode::Hang), tts, "");
    let result = conv.respond_speech("早晨", None, true, Some(Duration::from_millis(100)));
    assert_eq!(result.outcome, RespondOutcome::TimedOut);
    assert_eq!(result.text, "早晨");
    assert!(result.timed_out);
    assert!(result.success, "A timeout still delivers the text");
    assert_eq!(result.message.as_deref(), Some("synthesis timed out, text only"));
}

#[test]
fn test_long_text_is_truncated_before_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Speak);
    let conv = conversation(dir.path(), engine.clone());

    let long = "廣".repeat(300);
    let result = conv.respond_speech(&long, None, true, Some(Duration::from_secs(10)));

    assert_eq!(result.outcome, RespondOutcome::Spoken);
    assert!(result.text_truncated);
    assert_eq!(result.text, long, "Full text is preserved for display");
    assert!(result.spoken_text.ends_with('…'));
    // 10s * 0.8 / 0.3 per char
    assert!(result.spoken_text.chars().count() <= 26);

    let texts = engine.texts.lock();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0], result.spoken_text, "Engine receives the truncated text");
}

#[test]
fn test_disabled_output_never_reaches_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Speak);
    let conv = conversation(dir.path(), engine.clone());

    let result = conv.synthesize_response("唔該", None, None, false);

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(SynthesisErrorKind::OutputDisabled));
    assert_eq!(engine.calls(), 0);

    let forced = conv.synthesize_response("唔該", None, None, true);
    assert!(forced.success);
    assert_eq!(engine.calls(), 1);
}

#[test]
fn test_always_failing_engine_uses_whole_budget() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Fail);
    let conv = conversation(dir.path(), engine.clone());

    let result = conv.synthesize_response("唔該", None, None, true);

    assert!(!result.success);
    assert_eq!(engine.calls(), 3, "Default budget allows three attempts");
    assert_eq!(result.retry_count, 2);
    assert!(!result.timed_out);
    assert_eq!(result.error_kind(), Some(SynthesisErrorKind::EngineFailure));
}

#[test]
fn test_hanging_engine_returns_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Hang);
    let synthesizer = SpeechSynthesizer::new(
        tts_config(dir.path()),
        Arc::new(move |_dir: &Path| -> Result<Arc<dyn SpeechEngine>> {
            Ok(engine.clone() as Arc<dyn SpeechEngine>)
        }),
    );

    let request = synthesizer
        .request("慢慢講", dir.path().join("out.wav"))
        .with_deadline(Duration::from_millis(100))
        .with_retry_budget(1);

    let started = Instant::now();
    let result = synthesizer.synthesize(&request);

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!result.success);
    assert!(result.timed_out);
    assert_eq!(result.retry_count, 0);
    assert!(!dir.path().join("out.wav").exists());
}

#[test]
fn test_duration_matches_written_samples() {
    let dir = tempfile::tempdir().unwrap();
    let conv = conversation(dir.path(), StubEngine::new(Mode::Speak));
    let output = dir.path().join("reply.wav");

    let result = conv.synthesize_response("多謝", Some(output.clone()), None, true);

    assert!(result.success);
    assert_eq!(result.output_file.as_deref(), Some(output.as_path()));
    let (samples, rate, channels) = read_wav(&output).unwrap();
    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(channels, 1);
    assert!((result.duration - samples.len() as f64 / SAMPLE_RATE as f64).abs() < 1e-9);
    assert!((result.duration - 2.0).abs() < 1e-9);
}

#[test]
fn test_reference_placeholder_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let conv = conversation(dir.path(), StubEngine::new(Mode::Speak));
    let reference = dir.path().join("model/reference_audio.wav");

    assert!(conv.synthesize_response("一", None, None, true).success);
    assert!(reference.exists(), "Placeholder should be generated");
    let first = fs::metadata(&reference).unwrap().modified().unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(conv.synthesize_response("二", None, None, true).success);
    let second = fs::metadata(&reference).unwrap().modified().unwrap();

    assert_eq!(first, second, "Existing reference must not be rewritten");
}

#[test]
fn test_turn_stops_when_transcription_fails() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Speak);
    let conv = conversation(dir.path(), engine.clone());
    conv.enable_voice_output();

    let turn = conv.conversation_turn(&dir.path().join("missing.wav"), "回覆");

    assert!(!turn.success);
    assert!(!turn.confirmed);
    assert!(turn.response.is_none());
    assert!(turn.transcription.is_file_not_found());
    assert_eq!(engine.calls(), 0);
}

#[test]
fn test_turn_speaks_response() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Speak);
    let conv = conversation(dir.path(), engine.clone());
    conv.enable_voice_output();

    let turn = conv.conversation_turn(&audio_file(dir.path()), "回覆");

    assert!(turn.success);
    assert!(turn.confirmed);
    assert_eq!(turn.transcription.text, "你好");
    let response = turn.response.unwrap();
    assert_eq!(response.outcome, RespondOutcome::Spoken);
    assert_eq!(engine.calls(), 1);
}

#[test]
fn test_spoken_command_toggles_before_response() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::new(Mode::Speak);
    let conv = conversation_with(dir.path(), engine.clone(), tts_config(dir.path()), "［");

    let turn = conv.conversation_turn(&audio_file(dir.path()), "收到");

    assert_eq!(turn.transcription.control_action, ControlAction::Enable);
    assert!(turn.transcription.voice_enabled);
    assert_eq!(
        turn.response.map(|r| r.outcome),
        Some(RespondOutcome::Spoken),
        "Voice output was switched on by the transcript"
    );
    assert_eq!(engine.calls(), 1);
}
