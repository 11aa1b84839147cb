use crate::core::types::Language;

/// Weighted keyword vote between English and Spanish. Ties and empty text go to English.
pub fn detect_language(text: &str) -> Language {
    let text = text.to_lowercase();
    let has = |needle: &str| text.contains(needle);

    let mut en = 0.0f32;
    if has("software engineer") {
        en += 2.0;
    }
    if has("required") {
        en += 1.0;
    }
    if has("requirements") {
        en += 1.0;
    }
    if has("years") {
        en += 1.0;
    }
    if has("remote") && !has("remoto") {
        en += 0.5;
    }

    let mut es = 0.0f32;
    if has("ingeniero") {
        es += 2.0;
    }
    if has("desarrollador") {
        es += 2.0;
    }
    if has("requisitos") {
        es += 1.0;
    }
    if has("años") || has("experiencia") {
        es += 1.0;
    }
    if has("remoto") {
        es += 1.0;
    }

    if es > en {
        Language::Es
    } else {
        Language::En
    }
}
