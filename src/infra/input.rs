use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::error::InfraError;

const STDIN_MARKER: &str = "-";

/// Read markdown from `path`, or from standard input when `path` is `-`.
pub async fn read_source(path: &Path) -> Result<String, InfraError> {
    if path == Path::new(STDIN_MARKER) {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .map_err(|source_err| InfraError::InputFile {
                path: "<stdin>".to_string(),
                source: source_err,
            })?;
        return Ok(source);
    }

    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InfraError::InputFile {
            path: path.display().to_string(),
            source,
        })
}

pub async fn write_stdout(output: &str) -> Result<(), InfraError> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(output.as_bytes()).await?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}
