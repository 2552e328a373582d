//! Output key derivation and the base-name join key used by auditing.

use super::types::ExtractionMethod;

fn split_file_name(key: &str) -> (&str, &str) {
    match key.rfind('/') {
        Some(i) => key.split_at(i + 1),
        None => ("", key),
    }
}

/// Strip the extension (text from the last `.`) of a file name.
/// Dotfiles keep their leading dot.
fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(i) if i > 0 => &file_name[..i],
        _ => file_name,
    }
}

/// Derive the artifact key for a document key.
///
/// `cvs/valid/cv_7.pdf` + Local -> `cvs/valid/cv_7_pypdf.json`. Only the
/// extension of the final segment is replaced; directories are kept as-is.
pub fn output_key(input_key: &str, method: ExtractionMethod) -> String {
    let (dir, file_name) = split_file_name(input_key);
    format!(
        "{}{}{}",
        dir,
        strip_extension(file_name),
        method.output_suffix()
    )
}

/// File name without directory, document extension or method suffix.
///
/// Inputs and outputs of the same document share a base name:
/// `cvs/valid/cv_7.pdf` and `cvs/valid/cv_7_textract.json` both give `cv_7`.
pub fn base_name(key: &str) -> &str {
    let (_, file_name) = split_file_name(key);
    match ExtractionMethod::from_output_key(file_name) {
        Some(method) => &file_name[..file_name.len() - method.output_suffix().len()],
        None => strip_extension(file_name),
    }
}
