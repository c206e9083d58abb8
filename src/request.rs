//! Проверка входящего запроса /generate
//!
//! Тело запроса разбирается в типизированный `SynthesisRequest` за один проход.
//! Все нарушения схемы собираются в один список и возвращаются вместе как
//! `SvcError::BadInput`.

use serde_json::{Map, Value};

use crate::error::{Result, SvcError};
use crate::gpu::GpuSelection;

const USER_AUDIO: &str = "User Audio";
const CHARACTER: &str = "Character";
const PITCH_SHIFT: &str = "Pitch Shift";
const PREDICT_PITCH: &str = "Predict Pitch";
const SLICE_LENGTH: &str = "Slice Length";
const CROSSFADE_LENGTH: &str = "Cross-Fade Length";
const CHARACTER_LIKENESS: &str = "Character Likeness";
const REDUCE_HOARSENESS: &str = "Reduce Hoarseness";
const APPLY_NSF_HIFIGAN: &str = "Apply nsf_hifigan";
const NOISE_SCALE: &str = "Noise Scale";
const OUTPUT_FILE: &str = "Output File";
const GPU_ID: &str = "GPU ID";
const SESSION_ID: &str = "Session ID";

/// Параметры синтеза
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOptions {
    pub character: String,
    /// Сдвиг тона в полутонах
    pub pitch_shift: i64,
    pub predict_pitch: bool,
    /// Длина нарезки в секундах, 0 отключает нарезку
    pub slice_length: f64,
    pub crossfade_length: f64,
    /// Доля кластерной модели, 0..=1
    pub character_likeness: f64,
    pub reduce_hoarseness: bool,
    pub apply_nsf_hifigan: bool,
    pub noise_scale: f64,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            character: String::new(),
            pitch_shift: 0,
            predict_pitch: false,
            slice_length: 0.0,
            crossfade_length: 0.0,
            character_likeness: 0.0,
            reduce_hoarseness: false,
            apply_nsf_hifigan: false,
            noise_scale: 0.4,
        }
    }
}

/// Проверенный запрос на конвертацию
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Имя входного файла в кэше, без расширения
    pub user_audio: String,
    pub options: SynthesisOptions,
    /// Имя выходного файла в кэше, без расширения
    pub output_file: String,
    pub gpu: GpuSelection,
    pub session_id: Option<String>,
}

/// Разобрать сырое тело запроса
pub fn parse_request(body: &[u8]) -> Result<SynthesisRequest> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SvcError::BadInput(format!("Request body is not valid JSON: {}", e)))?;
    validate_request(&value)
}

/// Проверить JSON запроса и построить `SynthesisRequest`
pub fn validate_request(value: &Value) -> Result<SynthesisRequest> {
    let Some(root) = value.as_object() else {
        return Err(SvcError::BadInput("Request body must be a JSON object".to_string()));
    };

    let mut v = Validator::default();
    let inputs = v.section(root, "Inputs");
    let options = v.section(root, "Options");

    let user_audio = v.file_name(inputs, USER_AUDIO);
    let character = v.file_name(options, CHARACTER);
    let pitch_shift = v.integer(options, PITCH_SHIFT);
    let predict_pitch = v.boolean(options, PREDICT_PITCH);
    let slice_length = v.number(options, SLICE_LENGTH, None);
    let crossfade_length = v.number(options, CROSSFADE_LENGTH, None);
    let character_likeness = v.number(options, CHARACTER_LIKENESS, Some(1.0));
    let reduce_hoarseness = v.boolean(options, REDUCE_HOARSENESS);
    let apply_nsf_hifigan = v.boolean(options, APPLY_NSF_HIFIGAN);
    let noise_scale = v.number(options, NOISE_SCALE, None);
    let output_file = v.file_name(Some(root), OUTPUT_FILE);
    let gpu = v.gpu(root);
    let session_id = v.session(root);

    v.finish()?;

    Ok(SynthesisRequest {
        user_audio,
        options: SynthesisOptions {
            character,
            pitch_shift,
            predict_pitch,
            slice_length,
            crossfade_length,
            character_likeness,
            reduce_hoarseness,
            apply_nsf_hifigan,
            noise_scale,
        },
        output_file,
        gpu,
        session_id,
    })
}

/// Накопитель нарушений. Каждый геттер при ошибке записывает нарушение и
/// возвращает заглушку, финальный `finish` решает судьбу запроса.
#[derive(Default)]
struct Validator {
    violations: Vec<String>,
}

impl Validator {
    fn section<'a>(&mut self, root: &'a Map<String, Value>, name: &str) -> Option<&'a Map<String, Value>> {
        match root.get(name) {
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                self.violations.push(format!("\"{}\" should be an object", name));
                None
            }
            // Отсутствующая секция отражается в отсутствии каждого ее поля
            None => None,
        }
    }

    fn lookup<'a>(&mut self, map: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
        let value = map.and_then(|m| m.get(key));
        if value.is_none() {
            self.violations.push(format!("Missing \"{}\"", key));
        }
        value
    }

    fn wrong_type(&mut self, key: &str, expected: &str) {
        self.violations.push(format!("\"{}\" should be {}", key, expected));
    }

    fn file_name(&mut self, map: Option<&Map<String, Value>>, key: &str) -> String {
        match self.lookup(map, key) {
            Some(Value::String(s)) if is_plain_file_name(s) => s.clone(),
            Some(Value::String(s)) => {
                self.violations
                    .push(format!("\"{}\" must be a plain file name, got \"{}\"", key, s));
                String::new()
            }
            Some(_) => {
                self.wrong_type(key, "a string");
                String::new()
            }
            None => String::new(),
        }
    }

    fn integer(&mut self, map: Option<&Map<String, Value>>, key: &str) -> i64 {
        match self.lookup(map, key) {
            Some(value) => match value.as_i64() {
                Some(n) => n,
                None => {
                    self.wrong_type(key, "an integer");
                    0
                }
            },
            None => 0,
        }
    }

    fn boolean(&mut self, map: Option<&Map<String, Value>>, key: &str) -> bool {
        match self.lookup(map, key) {
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.wrong_type(key, "a boolean");
                false
            }
            None => false,
        }
    }

    /// Неотрицательное число, при `max` еще и ограниченное сверху
    fn number(&mut self, map: Option<&Map<String, Value>>, key: &str, max: Option<f64>) -> f64 {
        let Some(value) = self.lookup(map, key) else {
            return 0.0;
        };
        let Some(n) = value.as_f64() else {
            self.wrong_type(key, "a number");
            return 0.0;
        };
        if n < 0.0 {
            self.violations
                .push(format!("\"{}\" must be greater than or equal to 0, got {}", key, n));
        } else if let Some(max) = max.filter(|max| n > *max) {
            self.violations
                .push(format!("\"{}\" must be less than or equal to {}, got {}", key, max, n));
        }
        n
    }

    fn gpu(&mut self, root: &Map<String, Value>) -> GpuSelection {
        match self.lookup(Some(root), GPU_ID) {
            Some(Value::String(s)) if s.is_empty() => GpuSelection::Cpu,
            Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(index) => GpuSelection::Device(index),
                None => {
                    self.wrong_type(GPU_ID, "a non-negative integer or an empty string");
                    GpuSelection::Cpu
                }
            },
            None => GpuSelection::Cpu,
        }
    }

    fn session(&mut self, root: &Map<String, Value>) -> Option<String> {
        match self.lookup(Some(root), SESSION_ID) {
            Some(Value::String(s)) if is_plain_file_name(s) => Some(s.clone()),
            Some(Value::String(s)) => {
                self.violations
                    .push(format!("\"{}\" must be a plain file name, got \"{}\"", SESSION_ID, s));
                None
            }
            Some(Value::Null) | None => None,
            Some(_) => {
                self.wrong_type(SESSION_ID, "a string or null");
                None
            }
        }
    }

    fn finish(self) -> Result<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(SvcError::BadInput(self.violations.join("\n")))
        }
    }
}

/// Имя без разделителей пути, которое можно безопасно склеить с директорией
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
