/// A single file-system instruction extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateFolder { path: String },
    WriteFile { path: String, content: String },
    Rename { from: String, to: String },
    Remove { path: String },
}

const WRITE_OPEN: &str = "[WRITE_FILE:";
const WRITE_CLOSE: &str = "[/WRITE_FILE]";

/// Extract every operation from a raw model reply.
///
/// Each tag kind is scanned independently over the whole text, and the
/// result list is emitted in the fixed pass order CreateFolder, WriteFile,
/// Rename, Remove. Within one kind, operations keep their textual order.
/// Malformed or unterminated tags yield nothing; the parser never fails.
pub fn parse(text: &str) -> Vec<Operation> {
    let mut ops = Vec::new();

    for arg in single_line_args(text, "[CREATE_FOLDER:") {
        if arg.is_empty() {
            continue;
        }
        ops.push(Operation::CreateFolder { path: arg });
    }

    for (path, content) in write_blocks(text) {
        ops.push(Operation::WriteFile { path, content });
    }

    for arg in single_line_args(text, "[RENAME:") {
        // Both sides of the arrow are required; no arrow means no match.
        if let Some((from, to)) = arg.split_once("->") {
            ops.push(Operation::Rename {
                from: from.trim().to_string(),
                to: to.trim().to_string(),
            });
        }
    }

    for arg in single_line_args(text, "[REMOVE:") {
        ops.push(Operation::Remove { path: arg });
    }

    ops
}

/// Collect the trimmed arguments of every `<open> arg]` occurrence.
/// The argument must sit on one line; an occurrence whose closing bracket
/// lands on a later line is skipped.
fn single_line_args(text: &str, open: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(found) = text[pos..].find(open) {
        let arg_start = pos + found + open.len();
        match text[arg_start..].find(']') {
            Some(rel) => {
                let arg = &text[arg_start..arg_start + rel];
                if arg.contains('\n') {
                    pos = arg_start;
                    continue;
                }
                out.push(arg.trim().to_string());
                pos = arg_start + rel + 1;
            }
            None => break,
        }
    }
    out
}

/// Collect every `[WRITE_FILE: path] body [/WRITE_FILE]` block as
/// (trimmed path, trimmed body). An opener with no closer is skipped.
fn write_blocks(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(found) = text[pos..].find(WRITE_OPEN) {
        let path_start = pos + found + WRITE_OPEN.len();
        let Some(bracket) = text[path_start..].find(']') else {
            break;
        };
        let path = text[path_start..path_start + bracket].trim().to_string();
        let body_start = path_start + bracket + 1;
        match text[body_start..].find(WRITE_CLOSE) {
            Some(rel) => {
                let body = text[body_start..body_start + rel].trim().to_string();
                out.push((path, body));
                pos = body_start + rel + WRITE_CLOSE.len();
            }
            // No closer anywhere past this opener, so no later block can
            // close either.
            None => break,
        }
    }
    out
}

/// Strip every command tag (plus `[LOG: ...]` markers) out of a reply,
/// leaving only the prose for display. Prose outside the tags is untouched.
pub fn strip_actions(text: &str) -> String {
    let mut spans: Vec<(usize, usize)> = Vec::new();

    // WRITE_FILE blocks first so tags inside a body are not double-counted.
    let mut pos = 0;
    while let Some(found) = text[pos..].find(WRITE_OPEN) {
        let start = pos + found;
        let path_start = start + WRITE_OPEN.len();
        let Some(bracket) = text[path_start..].find(']') else {
            break;
        };
        let body_start = path_start + bracket + 1;
        match text[body_start..].find(WRITE_CLOSE) {
            Some(rel) => {
                let end = body_start + rel + WRITE_CLOSE.len();
                spans.push((start, end));
                pos = end;
            }
            None => break,
        }
    }

    for open in ["[LOG:", "[CREATE_FOLDER:", "[RENAME:", "[REMOVE:"] {
        let mut pos = 0;
        while let Some(found) = text[pos..].find(open) {
            let start = pos + found;
            let arg_start = start + open.len();
            match text[arg_start..].find(']') {
                Some(rel) => {
                    let end = arg_start + rel + 1;
                    if !spans.iter().any(|&(s, e)| start >= s && end <= e) {
                        spans.push((start, end));
                    }
                    pos = end;
                }
                None => break,
            }
        }
    }

    spans.sort();
    let mut clean = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        if start > cursor {
            clean.push_str(&text[cursor..start]);
        }
        cursor = cursor.max(end);
    }
    if cursor < text.len() {
        clean.push_str(&text[cursor..]);
    }
    clean.trim().to_string()
}
