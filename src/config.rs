use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "codegrade", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: Vec<ProviderConfig>,
    pub fallback: Option<FallbackConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub tests: Vec<TestConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// One remote execution backend. Order in the config file is priority order.
#[derive(Deserialize, Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub family: ProviderFamily,
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Response shape spoken by a provider, used to pick the normalizer branch.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    Judge,
    Script,
}

/// Structurally different secondary service tried once the whole primary
/// pool is exhausted. Always script-shaped.
#[derive(Deserialize, Debug, Clone)]
pub struct FallbackConfig {
    pub name: String,
    pub base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Delay between successive test-case executions, to stay under shared
    /// provider rate limits.
    pub case_delay_ms: u64,
    /// Client-side timeout for a single provider call.
    pub call_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            case_delay_ms: 100,
            call_timeout_secs: 15,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestConfig {
    pub id: String,
    pub title: String,
    pub duration_minutes: u32,
    pub questions: Vec<QuestionConfig>,
}

impl TestConfig {
    pub fn question(&self, question_id: &str) -> Option<&QuestionConfig> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct QuestionConfig {
    pub id: String,
    pub title: String,
    pub marks: f64,
    pub cases: Vec<CaseConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CaseConfig {
    pub input: String,
    pub expected_output: String,
    #[serde(default = "default_points")]
    pub points: f64,
    #[serde(default)]
    pub hidden: bool,
}

fn default_points() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    Javascript,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }

    /// Numeric language id understood by judge-family providers.
    pub fn judge_id(self) -> u32 {
        match self {
            Language::C => 50,
            Language::Cpp => 54,
            Language::Java => 62,
            Language::Javascript => 63,
            Language::Python => 71,
        }
    }

    /// Language name understood by script-family providers.
    pub fn script_name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "c++",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Python => "python",
        }
    }
}
