// PDF sink - one page, one "field: value" line per record field

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::NamedTempFile;

use crate::error::PipelineError;
use crate::schema::NormalizedRecord;

// A4 in points
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 40;
const FONT_SIZE: i64 = 12;
const LINE_HEIGHT: i64 = 16;
const FONT_ENCODING: &str = "WinAnsiEncoding";

/// The text lines written to the page, in field declaration order.
pub fn record_lines(record: &NormalizedRecord) -> Vec<String> {
    record
        .fields()
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect()
}

/// Encode a line for the page font. Characters outside WinAnsi are an error
/// rather than silently dropped.
fn encode_line(line: &str) -> Result<Vec<u8>, PipelineError> {
    let bytes = Document::encode_text(Some(FONT_ENCODING), line);
    if Document::decode_text(Some(FONT_ENCODING), &bytes) != line {
        return Err(PipelineError::Render(format!(
            "cannot encode {:?} in {}",
            line, FONT_ENCODING
        )));
    }
    Ok(bytes)
}

/// Build the single-page document in memory.
pub fn build_document(record: &NormalizedRecord) -> Result<Vec<u8>, PipelineError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => FONT_ENCODING,
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("TL", vec![LINE_HEIGHT.into()]),
        Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
    ];
    for line in record_lines(record) {
        operations.push(Operation::new("Tj", vec![Object::string_literal(encode_line(&line)?)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let encoded = content
        .encode()
        .map_err(|e| PipelineError::Render(format!("cannot encode page content: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| PipelineError::Render(format!("cannot serialize document: {}", e)))?;
    Ok(bytes)
}

/// Render `record` and atomically replace whatever is at `path`.
pub fn render_to_file(record: &NormalizedRecord, path: &Path) -> Result<(), PipelineError> {
    let bytes = build_document(record)?;
    replace_file(path, |file| file.write_all(&bytes))
}

/// Write through a temp file in the same directory, then rename over `path`.
/// A failed write never leaves a half-written file where a valid one used to
/// be; the temp file is removed on drop.
fn replace_file<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::Render(format!("cannot write to {}: {}", dir.display(), e)))?;
    write(tmp.as_file_mut())
        .and_then(|_| tmp.as_file().sync_all())
        .and_then(|_| set_readable(tmp.as_file()))
        .map_err(|e| PipelineError::Render(format!("cannot write {}: {}", tmp.path().display(), e)))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::Render(format!("cannot replace {}: {}", path.display(), e.error)))?;

    Ok(())
}

// Temp files are created 0600; rendered documents get the usual 0644.
#[cfg(unix)]
fn set_readable(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_readable(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Renders records into `output_dir/<source>.pdf`.
#[derive(Debug, Clone)]
pub struct PdfSink {
    output_dir: PathBuf,
}

impl PdfSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        PdfSink {
            output_dir: output_dir.into(),
        }
    }

    /// Destination for a given source. The source is percent-encoded so it
    /// cannot name a path outside `output_dir`.
    pub fn path_for(&self, source: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.pdf", urlencoding::encode(source)))
    }

    pub async fn render(&self, record: NormalizedRecord) -> Result<PathBuf, PipelineError> {
        let path = self.path_for(&record.source);
        let target = path.clone();

        tokio::task::spawn_blocking(move || render_to_file(&record, &target))
            .await
            .map_err(|e| PipelineError::Render(format!("render task failed: {}", e)))??;

        Ok(path)
    }
}
