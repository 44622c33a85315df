use crate::ast::Template;
use crate::error::RenderError;
use crate::fs::FileSystem;
use crate::parser;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;
use tracing::{debug, trace};

#[derive(Clone)]
pub(crate) struct CachedTemplate {
    pub ast: Arc<Template>,
    pub modified: SystemTime,
}

/// 进程级模板 AST 缓存，按绝对路径索引。条目是不可变快照，只会被整体覆盖，
/// 从不逐出；并发装载竞争时以最后写入为准。
pub(crate) static TEMPLATE_CACHE: LazyLock<DashMap<String, CachedTemplate>> =
    LazyLock::new(DashMap::new);

/// Look up or (re)load the compiled template for `path`. A cached entry is
/// fresh while its recorded modification time is >= the currently observed
/// one; only strictly newer timestamps force a re-read.
pub(crate) async fn resolve_ast(
    fs: &dyn FileSystem,
    path: &str,
) -> Result<Arc<Template>, RenderError> {
    let modified = fs.stat(path).await?;

    if let Some(entry) = TEMPLATE_CACHE.get(path) {
        if entry.modified >= modified {
            trace!(path, "template cache hit");
            return Ok(entry.ast.clone());
        }
    }

    let text = fs.read(path).await?;
    let ast = parser::parse(&text).map_err(|source| RenderError::Parse {
        path: path.to_string(),
        source,
    })?;
    let ast = Arc::new(ast);

    debug!(path, "parsed and cached template");
    TEMPLATE_CACHE.insert(
        path.to_string(),
        CachedTemplate {
            ast: ast.clone(),
            modified,
        },
    );

    Ok(ast)
}
