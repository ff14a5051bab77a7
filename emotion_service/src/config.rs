use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub models: ModelsConfig,
    #[serde(default)]
    pub face_margin: FaceMarginConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub audio_features: AudioFeaturesConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    Local,
    FetchOnMissing,
}

/// Where a model file lives locally and, optionally, where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub file: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaceDetectorConfig {
    pub file: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,
    #[serde(default = "default_score_thresh")]
    pub score_thresh: f64,
    #[serde(default = "default_pyramid_scale_factor")]
    pub pyramid_scale_factor: f32,
    #[serde(default = "default_slide_window_step")]
    pub slide_window_step: u32,
}

impl FaceDetectorConfig {
    pub fn source(&self) -> ModelSource {
        ModelSource {
            file: self.file.clone(),
            url: self.url.clone(),
        }
    }
}

fn default_min_face_size() -> u32 {
    20
}

fn default_score_thresh() -> f64 {
    2.0
}

fn default_pyramid_scale_factor() -> f32 {
    0.8
}

fn default_slide_window_step() -> u32 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub file: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl ClassifierConfig {
    pub fn source(&self) -> ModelSource {
        ModelSource {
            file: self.file.clone(),
            url: self.url.clone(),
        }
    }
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_intra_threads() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    pub provisioning: Provisioning,
    pub model_dir: PathBuf,
    pub face_detector: FaceDetectorConfig,
    pub image_classifier: ClassifierConfig,
    pub audio_classifier: ClassifierConfig,
}

impl ModelsConfig {
    pub fn get_path(&self, source: &ModelSource) -> PathBuf {
        self.model_dir.join(&source.file)
    }

    fn sources(&self) -> [(&'static str, ModelSource); 3] {
        [
            ("face_detector", self.face_detector.source()),
            ("image_classifier", self.image_classifier.source()),
            ("audio_classifier", self.audio_classifier.source()),
        ]
    }
}

impl Validatable for ModelsConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, source) in self.sources() {
            let path = self.get_path(&source);
            match self.provisioning {
                Provisioning::Local if !path.exists() => {
                    return Err(format!("Model file not found for {}: {:?}", name, path));
                }
                Provisioning::FetchOnMissing if !path.exists() && source.url.is_none() => {
                    return Err(format!(
                        "Model file {:?} for {} is missing and no url is configured",
                        path, name
                    ));
                }
                _ => {}
            }
        }
        for (name, cfg) in [
            ("image_classifier", &self.image_classifier),
            ("audio_classifier", &self.audio_classifier),
        ] {
            if cfg.num_instances == 0 {
                return Err(format!("{}.num_instances must be > 0", name));
            }
        }
        Ok(())
    }
}

/// Margin applied to the detector's tight face box before cropping.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct FaceMarginConfig {
    pub left: i32,
    pub top: i32,
    pub extra_width: i32,
    pub extra_height: i32,
}

impl Default for FaceMarginConfig {
    fn default() -> Self {
        Self {
            left: 80,
            top: 80,
            extra_width: 150,
            extra_height: 100,
        }
    }
}

impl Validatable for FaceMarginConfig {
    fn validate(&self) -> Result<(), String> {
        if self.left < 0 || self.top < 0 || self.extra_width < 0 || self.extra_height < 0 {
            return Err(format!("face margins must be non-negative: {:?}", self));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Bgr,
    Rgb,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub channel_order: ChannelOrder,
}

fn default_input_size() -> u32 {
    64
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            input_size: default_input_size(),
            channel_order: ChannelOrder::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_recording_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub device: Option<String>,
    /// Replays this WAV file instead of opening a microphone.
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
}

fn default_duration_secs() -> u64 {
    4
}

fn default_recording_rate() -> u32 {
    48_000
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            sample_rate: default_recording_rate(),
            device: None,
            replay_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioFeaturesConfig {
    #[serde(default = "default_analysis_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
    /// Fixed chroma tuning in fractions of a bin. Estimated per clip when unset.
    #[serde(default)]
    pub chroma_tuning: Option<f32>,
}

fn default_analysis_rate() -> u32 {
    22_050
}

fn default_max_frames() -> usize {
    254
}

impl Default for AudioFeaturesConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_analysis_rate(),
            max_frames: default_max_frames(),
            chroma_tuning: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
    #[serde(default = "default_audio_file")]
    pub audio_file: String,
    #[serde(default)]
    pub crop_dir: Option<PathBuf>,
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("saved_audio")
}

fn default_audio_file() -> String {
    "recorded_audio.wav".to_string()
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            audio_file: default_audio_file(),
            crop_dir: None,
        }
    }
}

impl ArtifactsConfig {
    pub fn get_audio_path(&self) -> PathBuf {
        self.audio_dir.join(&self.audio_file)
    }
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.face_margin.validate()?;
        if self.image.input_size == 0 {
            return Err("image.input_size must be > 0".to_string());
        }
        if self.recording.duration_secs == 0 || self.recording.sample_rate == 0 {
            return Err("recording duration and sample rate must be > 0".to_string());
        }
        if self.audio_features.sample_rate == 0 || self.audio_features.max_frames == 0 {
            return Err("audio_features sample rate and max frames must be > 0".to_string());
        }
        self.models.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("EMO")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}
