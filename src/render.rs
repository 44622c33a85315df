use crate::ast::{Node, Tag};
use crate::cache;
use crate::error::RenderError;
use crate::fs::{DiskFs, FileSystem};
use crate::value::Value;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// How many list items are rendered between cooperative yields. The yield is
/// a fairness point only; output stays in strict document order.
const YIELD_INTERVAL: u64 = 1000;

/// One level of the parent-linked scope chain. Frames are stack-scoped: one
/// per render root, plus one per section entry or array iteration whose value
/// is a map.
struct Frame<'a> {
    object: Value,
    parent: Option<&'a Frame<'a>>,
}

struct RenderState<'f> {
    fs: &'f dyn FileSystem,
    directory: String,
    out: Vec<u8>,
    steps: u64,
}

/// Render `filename` under `directory` against `view`, reading templates from
/// the real file system. Returns the complete output bytes, or the first
/// failure with no partial output.
pub async fn render(directory: &str, filename: &str, view: Value) -> Result<Vec<u8>, RenderError> {
    render_with(&DiskFs, directory, filename, view).await
}

/// Like [`render`] but with an explicit file-system collaborator.
pub async fn render_with(
    fs: &dyn FileSystem,
    directory: &str,
    filename: &str,
    view: Value,
) -> Result<Vec<u8>, RenderError> {
    debug!(directory, filename, "render");

    let root = Frame {
        object: view,
        parent: None,
    };
    let mut state = RenderState {
        fs,
        directory: format!("{}/", directory),
        out: Vec::new(),
        steps: 0,
    };

    run_template(&mut state, &root, filename).await?;
    Ok(state.out)
}

async fn run_template(
    state: &mut RenderState<'_>,
    ctx: &Frame<'_>,
    filename: &str,
) -> Result<(), RenderError> {
    // Plain concatenation, no normalization; the cache key is exactly this.
    let path = format!("{}{}", state.directory, filename);
    let ast = cache::resolve_ast(state.fs, &path).await?;
    run_list(state, &path, ctx, &ast.items).await
}

fn run_list<'a, 'f: 'a>(
    state: &'a mut RenderState<'f>,
    path: &'a str,
    ctx: &'a Frame<'a>,
    items: &'a [Node],
) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>> {
    Box::pin(async move {
        for item in items {
            state.steps += 1;
            if state.steps % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }

            match item {
                Node::Text(content) => state.out.extend_from_slice(content.as_bytes()),
                Node::Variable(tag) => {
                    let value = resolve(ctx, &tag.key).await?;
                    echo(&mut state.out, &value, false);
                }
                Node::Unescaped(tag) => {
                    let value = resolve(ctx, &tag.key).await?;
                    echo(&mut state.out, &value, true);
                }
                Node::Section { open, body, .. } => {
                    run_section(state, path, ctx, open, body).await?;
                }
                Node::Inverted { open, body, .. } => {
                    run_inverted(state, path, ctx, open, body).await?;
                }
                Node::Partial(partial) => {
                    // Partials see the including scope, not a fresh root.
                    run_template(state, ctx, &partial.name).await?;
                }
            }
        }
        Ok(())
    })
}

async fn run_section<'a>(
    state: &mut RenderState<'_>,
    path: &str,
    ctx: &'a Frame<'a>,
    open: &Tag,
    body: &'a [Node],
) -> Result<(), RenderError> {
    let value = resolve(ctx, &open.key).await?;

    match value {
        Value::Section(f) => {
            let text = match body {
                [Node::Text(text)] => text,
                _ => {
                    return Err(RenderError::SectionBody {
                        path: path.to_string(),
                        tag: open.src.clone(),
                        line: open.line,
                        col: open.col,
                    });
                }
            };
            // The function's failure is the render failure; its output
            // bypasses escaping regardless of tag flavor.
            let result = f.call(text)?;
            echo(&mut state.out, &result, true);
            Ok(())
        }
        Value::List(items) => {
            for element in items {
                let element = materialize(element).await?;
                if matches!(element, Value::Map(_)) {
                    let frame = Frame {
                        object: element,
                        parent: Some(ctx),
                    };
                    run_list(state, path, &frame, body).await?;
                } else {
                    run_list(state, path, ctx, body).await?;
                }
            }
            Ok(())
        }
        value if value.is_truthy() => {
            if matches!(value, Value::Map(_)) {
                let frame = Frame {
                    object: value,
                    parent: Some(ctx),
                };
                run_list(state, path, &frame, body).await
            } else {
                run_list(state, path, ctx, body).await
            }
        }
        _ => Ok(()),
    }
}

async fn run_inverted<'a>(
    state: &mut RenderState<'_>,
    path: &str,
    ctx: &'a Frame<'a>,
    open: &Tag,
    body: &'a [Node],
) -> Result<(), RenderError> {
    let value = resolve(ctx, &open.key).await?;

    let falsy = match &value {
        Value::List(items) => items.is_empty(),
        other => !other.is_truthy(),
    };

    // The inverted body never pushes a frame.
    if falsy {
        run_list(state, path, ctx, body).await
    } else {
        Ok(())
    }
}

/// Resolve a key path against the context chain. Scope search walks up to the
/// first frame owning the first part (defaulting to the innermost frame),
/// then descends part by part, materializing lazy values along the way.
/// Absent properties short-circuit to `Null`.
async fn resolve(ctx: &Frame<'_>, key: &[String]) -> Result<Value, RenderError> {
    let first = key[0].as_str();

    let mut frame = ctx;
    while !frame.object.has(first) {
        match frame.parent {
            Some(parent) => frame = parent,
            None => break,
        }
    }

    let mut current = frame.object.get(first).cloned().unwrap_or(Value::Null);

    // Logically redundant fast path; must match the general path below.
    if key.len() == 1 && !matches!(current, Value::Lazy(_)) {
        return Ok(current);
    }

    for part in &key[1..] {
        current = materialize(current).await?;
        if !current.has(part) {
            return Ok(Value::Null);
        }
        current = current.get(part).cloned().unwrap_or(Value::Null);
    }

    materialize(current).await
}

/// Unwrap lazy values until a plain value is reached. The computation is
/// re-invoked on every call; reported failures abort the render, while panics
/// inside the computation unwind to the host.
fn materialize(value: Value) -> Pin<Box<dyn Future<Output = Result<Value, RenderError>> + Send>> {
    Box::pin(async move {
        match value {
            Value::Lazy(lazy) => {
                let next = lazy.resolve().await?;
                materialize(next).await
            }
            other => Ok(other),
        }
    })
}

fn echo(out: &mut Vec<u8>, value: &Value, unescaped: bool) {
    let Some(text) = value.to_text() else {
        return;
    };
    if unescaped {
        out.extend_from_slice(text.as_bytes());
    } else {
        escape_into(out, &text);
    }
}

/// HTML-entity encoding of exactly `" & ' < >`, left-to-right.
fn escape_into(out: &mut Vec<u8>, text: &str) {
    for &byte in text.as_bytes() {
        match byte {
            b'"' => out.extend_from_slice(b"&quot;"),
            b'&' => out.extend_from_slice(b"&amp;"),
            b'\'' => out.extend_from_slice(b"&apos;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            _ => out.push(byte),
        }
    }
}
