use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use so_vits_svc_server::cache::{AudioCache, CacheStage, FileAudioCache};
use so_vits_svc_server::inference::{InferenceCommand, InferenceRunner, ProcessRunner};
use so_vits_svc_server::server::{handlers, AppState, MessageResponse};
use so_vits_svc_server::{ConversionStage, Converter, Result, ServiceConfig, SvcError};

/// Имитация inference_main.py: проверяет вход в raw и пишет заданное число файлов в results
struct FakeInference {
    results_dir: PathBuf,
    raw_dir: PathBuf,
    outputs: usize,
    calls: Mutex<Vec<InferenceCommand>>,
    saw_input: Mutex<bool>,
}

impl FakeInference {
    fn new(config: &ServiceConfig, outputs: usize) -> Arc<Self> {
        Arc::new(Self {
            results_dir: config.results_dir.clone(),
            raw_dir: config.raw_dir.clone(),
            outputs,
            calls: Mutex::new(Vec::new()),
            saw_input: Mutex::new(false),
        })
    }

    fn calls(&self) -> Vec<InferenceCommand> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InferenceRunner for FakeInference {
    async fn run(&self, command: &InferenceCommand) -> Result<()> {
        self.calls.lock().unwrap().push(command.clone());
        *self.saw_input.lock().unwrap() = self.raw_dir.join("input.flac").is_file();
        for i in 0..self.outputs {
            fs::write(self.results_dir.join(format!("input.flac_{}key.flac", i)), b"converted")?;
        }
        Ok(())
    }
}

struct Setup {
    _root: TempDir,
    config: ServiceConfig,
    cache: Arc<FileAudioCache>,
    character_dir: PathBuf,
}

fn setup(model_config: Value) -> Setup {
    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::with_root(root.path());

    let character_dir = config.character_dir("Rarity");
    fs::create_dir_all(&character_dir).unwrap();
    fs::write(character_dir.join("G_2000.pth"), b"weights").unwrap();
    fs::write(character_dir.join("config.json"), model_config.to_string()).unwrap();
    fs::write(character_dir.join("kmeans_10000.pt"), b"kmeans").unwrap();

    let cache = Arc::new(FileAudioCache::from_config(&config));
    cache
        .write(CacheStage::Preprocessed, Some("s1"), "input", b"input-audio")
        .unwrap();

    Setup {
        _root: root,
        config,
        cache,
        character_dir,
    }
}

fn single_speaker() -> Value {
    json!({"data": {"sampling_rate": 44100}, "spk": {"rarity": 0}})
}

fn body(noise_scale: f64, likeness: f64) -> Vec<u8> {
    json!({
        "Inputs": {"User Audio": "input"},
        "Options": {
            "Character": "Rarity",
            "Pitch Shift": 0,
            "Predict Pitch": false,
            "Slice Length": 0.0,
            "Cross-Fade Length": 2.0,
            "Character Likeness": likeness,
            "Reduce Hoarseness": false,
            "Apply nsf_hifigan": false,
            "Noise Scale": noise_scale
        },
        "Output File": "result",
        "GPU ID": "",
        "Session ID": "s1"
    })
    .to_string()
    .into_bytes()
}

fn converter(setup: &Setup, runner: Arc<FakeInference>) -> Converter {
    Converter::new(setup.config.clone(), setup.cache.clone(), runner)
}

fn is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[tokio::test]
async fn test_successful_conversion_forwards_output_and_cleans_up() {
    let setup = setup(single_speaker());
    let runner = FakeInference::new(&setup.config, 1);
    let converter = converter(&setup, runner.clone());

    converter.handle(&body(0.0, 0.0)).await.unwrap();

    assert!(*runner.saw_input.lock().unwrap());
    assert_eq!(
        setup.cache.read(CacheStage::Output, Some("s1"), "result").unwrap(),
        b"converted"
    );
    assert!(is_empty(&setup.config.raw_dir));
    assert!(is_empty(&setup.config.results_dir));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let args = &calls[0].args;
    assert_eq!(args[0], setup.config.inference_script.display().to_string());
    assert!(!args.iter().any(|a| a == "--noice_scale"));
    assert!(!args.iter().any(|a| a == "--linear_gradient"));
    assert!(!args.iter().any(|a| a == "--cluster_model_path"));
}

#[tokio::test]
async fn test_likeness_pulls_in_cluster_model() {
    let setup = setup(single_speaker());
    let runner = FakeInference::new(&setup.config, 1);
    let converter = converter(&setup, runner.clone());

    converter.handle(&body(0.4, 0.5)).await.unwrap();

    let args = &runner.calls()[0].args;
    let index = args.iter().position(|a| a == "--cluster_model_path").unwrap();
    assert_eq!(args[index + 1], setup.character_dir.join("kmeans_10000.pt").display().to_string());
    assert!(args.iter().any(|a| a == "--noice_scale"));
}

#[tokio::test]
async fn test_missing_speaker_selector_fails_before_invocation() {
    let setup = setup(json!({"data": {}, "spk": {"rarity": 0, "sweetie": 1}}));
    let runner = FakeInference::new(&setup.config, 1);
    let converter = converter(&setup, runner.clone());

    let failure = converter.handle(&body(0.0, 0.0)).await.unwrap_err();
    assert_eq!(failure.stage, ConversionStage::Resolving);
    assert!(matches!(failure.error, SvcError::SpeakerSelectorMissing(_)));
    assert!(runner.calls().is_empty());
    assert!(is_empty(&setup.config.raw_dir));

    // Для ошибок поиска модели в отчет попадает содержимое папки персонажа
    let report = failure.report();
    assert!(report.contains("G_2000.pth"), "character files should be listed: {}", report);
    assert!(report.contains("kmeans_10000.pt"));
}

#[tokio::test]
async fn test_unknown_character_lists_available_characters() {
    let setup = setup(single_speaker());
    let runner = FakeInference::new(&setup.config, 1);
    let converter = converter(&setup, runner);

    let body = String::from_utf8(body(0.0, 0.0)).unwrap().replace("\"Rarity\"", "\"Fluttershy\"");
    let failure = converter.handle(body.as_bytes()).await.unwrap_err();
    assert!(matches!(failure.error, SvcError::ModelNotFound(_)));
    assert!(failure.report().contains("contains: Rarity"));
}

#[tokio::test]
async fn test_no_output_reports_directories() {
    let setup = setup(single_speaker());
    let runner = FakeInference::new(&setup.config, 0);
    let converter = converter(&setup, runner);

    let failure = converter.handle(&body(0.0, 0.0)).await.unwrap_err();
    assert_eq!(failure.stage, ConversionStage::Collecting);
    assert!(matches!(failure.error, SvcError::NoOutputProduced(_)));

    let report = failure.report();
    assert!(report.contains("No output file was produced"));
    assert!(report.contains("input.flac"), "staged input should be listed: {}", report);
    assert!(is_empty(&setup.config.raw_dir));
}

#[tokio::test]
async fn test_two_outputs_are_ambiguous() {
    let setup = setup(single_speaker());
    let runner = FakeInference::new(&setup.config, 2);
    let converter = converter(&setup, runner);

    let failure = converter.handle(&body(0.0, 0.0)).await.unwrap_err();
    assert!(matches!(failure.error, SvcError::AmbiguousOutput { cleaned: true, .. }));
    assert!(is_empty(&setup.config.results_dir));
}

#[tokio::test]
async fn test_generate_endpoint_status_codes() {
    let setup = setup(single_speaker());
    let runner = FakeInference::new(&setup.config, 1);
    let state = Arc::new(AppState::new(converter(&setup, runner)));

    let response = handlers::generate(State(state.clone()), Bytes::from(body(0.0, 0.0))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = handlers::generate(State(state.clone()), Bytes::from_static(b"{\"Inputs\": {}}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let message: MessageResponse = serde_json::from_slice(&bytes).unwrap();
    let text = message.decode().unwrap();
    assert!(text.contains("Missing \"User Audio\""));
    assert!(text.contains("Missing \"Character\""));
    assert!(text.contains("Missing \"Output File\""));

    fs::remove_file(setup.character_dir.join("G_2000.pth")).unwrap();
    let response = handlers::generate(State(state), Bytes::from(body(0.0, 0.0))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let message: MessageResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(message.decode().unwrap().contains("Model file was not found"));
}

/// Конфигурация, в которой вместо Python запускается sh со скриптом, пишущим
/// результат через секунду
#[cfg(unix)]
fn slow_process_setup() -> (Setup, Converter) {
    let mut setup = setup(single_speaker());
    let script = setup._root.path().join("slow_inference.sh");
    fs::write(
        &script,
        format!(
            "sleep 1\nprintf late > '{}'\n",
            setup.config.results_dir.join("orphan.flac").display()
        ),
    )
    .unwrap();
    setup.config.python_executable = PathBuf::from("sh");
    setup.config.inference_script = script;

    let converter = Converter::new(setup.config.clone(), setup.cache.clone(), Arc::new(ProcessRunner::new()));
    (setup, converter)
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancelled_conversion_leaves_no_late_output() {
    let (setup, converter) = slow_process_setup();

    let cancelled = tokio::time::timeout(Duration::from_millis(200), converter.handle(&body(0.0, 0.0))).await;
    assert!(cancelled.is_err());
    assert!(is_empty(&setup.config.results_dir));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(is_empty(&setup.config.results_dir));
    assert!(is_empty(&setup.config.raw_dir));
}

#[cfg(unix)]
#[tokio::test]
async fn test_generate_finishes_after_client_disconnects() {
    let (setup, converter) = slow_process_setup();
    let state = Arc::new(AppState::new(converter));

    let request = handlers::generate(State(state), Bytes::from(body(0.0, 0.0)));
    assert!(tokio::time::timeout(Duration::from_millis(200), request).await.is_err());

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(
        setup.cache.read(CacheStage::Output, Some("s1"), "result").unwrap(),
        b"late"
    );
    assert!(is_empty(&setup.config.results_dir));
    assert!(is_empty(&setup.config.raw_dir));
}
