//! Quiz configuration and question loading.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::agent::{AgentConfig, OLLAMA_BASE_URL};
use crate::context::{BuildContext, InstallationLookup};
use crate::discovery::normalize_path;
use crate::{ConfigError, Result};

/// Model used by the judge agent when a quiz does not configure one.
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-oss:20b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuizQuestionType {
    Qa,
    FillBlank,
    MultipleChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestionMetadata {
    #[serde(rename = "type")]
    pub question_type: QuizQuestionType,
    pub uuid: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub inputs: String,
    pub expected_output: String,
    pub metadata: QuizQuestionMetadata,
}

#[derive(Deserialize)]
struct QuestionFile {
    cases: Vec<QuizQuestion>,
}

/// Where a quiz's questions come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    /// `<stem>.json`, searched for across the quizzes paths.
    Stem(String),
    /// Explicit file, relative to the declaring document.
    Override(String),
}

/// A configured quiz.
#[derive(Debug)]
pub struct QuizConfig {
    pub id: String,
    pub title: String,
    pub randomize: bool,
    pub max_questions: Option<usize>,
    pub question_source: QuestionSource,
    pub judge_agent: AgentConfig,
    pub config_path: PathBuf,
    questions: Mutex<Option<Arc<Vec<QuizQuestion>>>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QuizYaml {
    id: String,
    #[serde(default)]
    question_file: Option<String>,
    #[serde(default, rename = "_question_file_stem")]
    question_file_stem: Option<String>,
    #[serde(default, rename = "_question_file_path_override")]
    question_file_path_override: Option<String>,
    #[serde(default = "default_title")]
    title: String,
    #[serde(default)]
    randomize: bool,
    #[serde(default)]
    max_questions: Option<usize>,
    #[serde(default)]
    judge_agent: Option<Value>,
}

fn default_title() -> String {
    "Quiz".to_string()
}

impl QuizConfig {
    /// Build from one entry of a room's `quizzes` list.
    pub fn from_yaml(ctx: &BuildContext<'_>, value: Value) -> Result<Self> {
        let parsed: QuizYaml = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::invalid(ctx.config_path, "quiz config", e))?;

        let mut stem = parsed.question_file_stem;
        let mut override_path = parsed.question_file_path_override;
        if let Some(question_file) = parsed.question_file {
            if question_file.contains('/') {
                override_path = Some(question_file);
            } else {
                let trimmed = question_file
                    .strip_suffix(".json")
                    .unwrap_or(&question_file);
                stem = Some(trimmed.to_string());
            }
        }

        let question_source = match (stem, override_path) {
            (Some(stem), None) => QuestionSource::Stem(stem),
            (None, Some(path)) => QuestionSource::Override(path),
            _ => {
                return Err(ConfigError::QuizExactlyOneOfStemOrOverride {
                    quiz_id: parsed.id,
                    path: ctx.config_path.display().to_string(),
                });
            }
        };

        let judge_agent = match parsed.judge_agent {
            Some(value) => AgentConfig::from_yaml(ctx, None, value)?,
            None => {
                let mut judge = AgentConfig::new(format!("quiz-{}-judge", parsed.id), ctx.config_path);
                judge.model_name = Some(DEFAULT_JUDGE_MODEL.to_string());
                judge.provider_base_url = ctx.lookup.get_environment(OLLAMA_BASE_URL);
                judge
            }
        };

        Ok(Self {
            id: parsed.id,
            title: parsed.title,
            randomize: parsed.randomize,
            max_questions: parsed.max_questions,
            question_source,
            judge_agent,
            config_path: ctx.config_path.to_path_buf(),
            questions: Mutex::new(None),
        })
    }

    /// Locate the question file.
    pub fn question_file_path(&self, lookup: &dyn InstallationLookup) -> Result<PathBuf> {
        match &self.question_source {
            QuestionSource::Override(relative) => {
                let path =
                    normalize_path(&crate::discovery::config_dir(&self.config_path).join(relative));
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(ConfigError::QuestionFileNotFoundWithOverride {
                        override_path: relative.clone(),
                        path: self.config_path.display().to_string(),
                    })
                }
            }
            QuestionSource::Stem(stem) => lookup
                .quizzes_paths()
                .iter()
                .map(|dir| dir.join(format!("{}.json", stem)))
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| ConfigError::QuestionFileNotFoundWithStem {
                    stem: stem.clone(),
                    searched: lookup
                        .quizzes_paths()
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                }),
        }
    }

    /// Questions in file order, loaded once.
    fn load_questions(&self, lookup: &dyn InstallationLookup) -> Result<Arc<Vec<QuizQuestion>>> {
        let mut cached = self.questions.lock();
        if let Some(questions) = cached.as_ref() {
            return Ok(Arc::clone(questions));
        }

        let path = self.question_file_path(lookup)?;
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        let file: QuestionFile =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseQuestions {
                path: path.display().to_string(),
                source: e,
            })?;

        let questions = Arc::new(keyed_by_uuid(file.cases));
        debug!(quiz = %self.id, path = %path.display(), count = questions.len(), "loaded questions");
        *cached = Some(Arc::clone(&questions));
        Ok(questions)
    }

    /// Questions to ask: shuffled if `randomize`, capped at `max_questions`.
    pub fn get_questions(&self, lookup: &dyn InstallationLookup) -> Result<Vec<QuizQuestion>> {
        let mut questions = self.load_questions(lookup)?.as_ref().clone();

        if self.randomize {
            questions.shuffle(&mut rand::rng());
        }
        if let Some(max) = self.max_questions {
            questions.truncate(max);
        }
        Ok(questions)
    }

    pub fn get_question(&self, lookup: &dyn InstallationLookup, uuid: &str) -> Result<QuizQuestion> {
        self.load_questions(lookup)?
            .iter()
            .find(|q| q.metadata.uuid == uuid)
            .cloned()
            .ok_or_else(|| ConfigError::QuestionNotFound(uuid.to_string()))
    }
}

/// Questions are keyed by uuid: a repeated uuid replaces the earlier case
/// but keeps its position.
fn keyed_by_uuid(cases: Vec<QuizQuestion>) -> Vec<QuizQuestion> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut questions: Vec<QuizQuestion> = Vec::with_capacity(cases.len());
    for case in cases {
        match positions.get(&case.metadata.uuid) {
            Some(&index) => questions[index] = case,
            None => {
                positions.insert(case.metadata.uuid.clone(), questions.len());
                questions.push(case);
            }
        }
    }
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::StaticLookup;
    use crate::registry::Plugins;
    use std::path::Path;
    use tempfile::TempDir;

    const QUESTIONS: &str = r#"{
  "cases": [
    {"inputs": "2 + 2?", "expected_output": "4",
     "metadata": {"type": "qa", "uuid": "q1"}},
    {"inputs": "The sky is ___.", "expected_output": "blue",
     "metadata": {"type": "fill-blank", "uuid": "q2"}},
    {"inputs": "Pick a prime.", "expected_output": "7",
     "metadata": {"type": "multiple-choice", "uuid": "q3", "options": ["4", "7", "9"]}}
  ]
}"#;

    fn build(lookup: &StaticLookup, config_path: &Path, yaml: &str) -> Result<QuizConfig> {
        let plugins = Plugins::builtin();
        let ctx = BuildContext::new(lookup, &plugins, config_path);
        QuizConfig::from_yaml(&ctx, serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_question_file_forms() {
        let lookup = StaticLookup::default();
        let path = Path::new("room_config.yaml");

        let stem = build(&lookup, path, "id: q\nquestion_file: arithmetic.json\n").unwrap();
        assert_eq!(stem.question_source, QuestionSource::Stem("arithmetic".to_string()));
        assert_eq!(stem.title, "Quiz");
        assert!(!stem.randomize);

        let over = build(&lookup, path, "id: q\nquestion_file: ./data/arith.json\n").unwrap();
        assert_eq!(over.question_source, QuestionSource::Override("./data/arith.json".to_string()));

        let explicit = build(&lookup, path, "id: q\n_question_file_stem: arith\n").unwrap();
        assert_eq!(explicit.question_source, QuestionSource::Stem("arith".to_string()));
    }

    #[test]
    fn test_exactly_one_question_source() {
        let lookup = StaticLookup::default();
        let path = Path::new("room_config.yaml");

        let both = build(
            &lookup,
            path,
            "id: q\n_question_file_stem: a\n_question_file_path_override: ./b.json\n",
        );
        assert!(matches!(both, Err(ConfigError::QuizExactlyOneOfStemOrOverride { .. })));

        let neither = build(&lookup, path, "id: q\n");
        assert!(matches!(neither, Err(ConfigError::QuizExactlyOneOfStemOrOverride { .. })));
    }

    #[test]
    fn test_default_judge_agent() {
        let lookup = StaticLookup::default().with_env(OLLAMA_BASE_URL, "http://ollama:11434");
        let quiz = build(&lookup, Path::new("room_config.yaml"), "id: arith\nquestion_file: arith\n").unwrap();
        assert_eq!(quiz.judge_agent.id, "quiz-arith-judge");
        assert_eq!(quiz.judge_agent.model_name.as_deref(), Some(DEFAULT_JUDGE_MODEL));
        assert_eq!(
            quiz.judge_agent.provider_base_url.as_deref(),
            Some("http://ollama:11434")
        );
    }

    #[test]
    fn test_questions_found_by_stem() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(second.join("arith.json"), QUESTIONS).unwrap();

        let lookup = StaticLookup::default()
            .with_quizzes_path(&first)
            .with_quizzes_path(&second);
        let quiz = build(&lookup, Path::new("room_config.yaml"), "id: arith\nquestion_file: arith\n").unwrap();

        assert_eq!(quiz.question_file_path(&lookup).unwrap(), second.join("arith.json"));
        let questions = quiz.get_questions(&lookup).unwrap();
        assert_eq!(
            questions.iter().map(|q| q.metadata.uuid.as_str()).collect::<Vec<_>>(),
            vec!["q1", "q2", "q3"]
        );
        assert_eq!(questions[2].metadata.question_type, QuizQuestionType::MultipleChoice);
        assert_eq!(questions[2].metadata.options, vec!["4", "7", "9"]);
    }

    #[test]
    fn test_stem_not_found() {
        let dir = TempDir::new().unwrap();
        let lookup = StaticLookup::default().with_quizzes_path(dir.path());
        let quiz = build(&lookup, Path::new("room_config.yaml"), "id: q\nquestion_file: absent\n").unwrap();
        assert!(matches!(
            quiz.get_questions(&lookup),
            Err(ConfigError::QuestionFileNotFoundWithStem { .. })
        ));
    }

    #[test]
    fn test_override_relative_to_document() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/arith.json"), QUESTIONS).unwrap();
        let config_path = dir.path().join("room_config.yaml");

        let lookup = StaticLookup::default();
        let quiz = build(&lookup, &config_path, "id: q\nquestion_file: ./data/arith.json\n").unwrap();
        assert_eq!(quiz.get_question(&lookup, "q2").unwrap().expected_output, "blue");
        assert!(matches!(
            quiz.get_question(&lookup, "nope"),
            Err(ConfigError::QuestionNotFound(ref uuid)) if uuid == "nope"
        ));

        let missing = build(&lookup, &config_path, "id: q\nquestion_file: ./data/other.json\n").unwrap();
        assert!(matches!(
            missing.question_file_path(&lookup),
            Err(ConfigError::QuestionFileNotFoundWithOverride { .. })
        ));
    }

    #[test]
    fn test_randomize_and_max_questions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("arith.json"), QUESTIONS).unwrap();
        let lookup = StaticLookup::default().with_quizzes_path(dir.path());

        let quiz = build(
            &lookup,
            Path::new("room_config.yaml"),
            "id: q\nquestion_file: arith\nrandomize: true\nmax_questions: 2\n",
        )
        .unwrap();
        let questions = quiz.get_questions(&lookup).unwrap();
        assert_eq!(questions.len(), 2);
        for question in &questions {
            assert!(["q1", "q2", "q3"].contains(&question.metadata.uuid.as_str()));
        }
    }

    #[test]
    fn test_questions_are_cached() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("arith.json");
        std::fs::write(&file, QUESTIONS).unwrap();
        let lookup = StaticLookup::default().with_quizzes_path(dir.path());

        let quiz = build(&lookup, Path::new("room_config.yaml"), "id: q\nquestion_file: arith\n").unwrap();
        assert_eq!(quiz.get_questions(&lookup).unwrap().len(), 3);

        std::fs::remove_file(&file).unwrap();
        assert_eq!(quiz.get_questions(&lookup).unwrap().len(), 3);
    }

    #[test]
    fn test_repeated_uuid_keeps_last_case() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("dupes.json"),
            r#"{"cases": [
                {"inputs": "old", "expected_output": "1", "metadata": {"type": "qa", "uuid": "q1"}},
                {"inputs": "other", "expected_output": "2", "metadata": {"type": "qa", "uuid": "q2"}},
                {"inputs": "new", "expected_output": "3", "metadata": {"type": "qa", "uuid": "q1"}}
            ]}"#,
        )
        .unwrap();
        let lookup = StaticLookup::default().with_quizzes_path(dir.path());

        let quiz = build(&lookup, Path::new("room_config.yaml"), "id: q
question_file: dupes
").unwrap();
        let questions = quiz.get_questions(&lookup).unwrap();
        assert_eq!(
            questions.iter().map(|q| q.inputs.as_str()).collect::<Vec<_>>(),
            vec!["new", "other"]
        );
        assert_eq!(quiz.get_question(&lookup, "q1").unwrap().expected_output, "3");
    }

    #[test]
    fn test_malformed_question_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{\"cases\": [{\"inputs\": 1}]}").unwrap();
        let lookup = StaticLookup::default().with_quizzes_path(dir.path());

        let quiz = build(&lookup, Path::new("room_config.yaml"), "id: q\nquestion_file: bad\n").unwrap();
        assert!(matches!(
            quiz.get_questions(&lookup),
            Err(ConfigError::ParseQuestions { .. })
        ));
    }
}
