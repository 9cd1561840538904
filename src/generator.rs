//! Batch orchestration: validate inputs, render one certificate per record
//! into a staging directory, then pack everything into the run's archive.
//!
//! A batch is all-or-nothing. Staged certificates and the in-progress archive
//! live in `tempfile` handles, so they are removed on every exit path and a
//! failed run leaves nothing under the output directory.

use std::fmt;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::data::{self, Record};
use crate::error::GenerationError;
use crate::render::color::parse_color;
use crate::render::{
    CertificateRenderer, DocumentRenderer, FontResolution, Placement, RasterRenderer, TemplateKind,
};
use crate::storage::{generate_run_id, StorageLayout};

pub const ARCHIVE_FILE_NAME: &str = "certificados.zip";

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub template_name: String,
    pub data_name: String,
    pub name_field: String,
    pub x: i64,
    pub y: i64,
    /// Variant default when `None`.
    pub color: Option<String>,
    /// Variant default when `None`.
    pub font_size: Option<i64>,
}

impl GenerationRequest {
    pub fn new(template_name: impl Into<String>, data_name: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            data_name: data_name.into(),
            name_field: "nombre".to_string(),
            x: 100,
            y: 100,
            color: None,
            font_size: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub run_id: String,
    pub archive_path: PathBuf,
    /// Archive entry names in the order they were written.
    pub entries: Vec<String>,
    pub font_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Validating,
    Processing { done: usize, total: usize },
    Archiving,
    Done,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Idle => f.write_str("idle"),
            BatchState::Validating => f.write_str("validating"),
            BatchState::Processing { done, total } => write!(f, "processing {}/{}", done, total),
            BatchState::Archiving => f.write_str("archiving"),
            BatchState::Done => f.write_str("done"),
            BatchState::Failed => f.write_str("failed"),
        }
    }
}

struct ValidatedBatch {
    kind: TemplateKind,
    template_path: PathBuf,
    placement: Placement,
    records: Vec<Record>,
}

struct StagedCertificate {
    entry_name: String,
    file: NamedTempFile,
}

#[derive(Clone, Debug)]
pub struct BatchOrchestrator {
    layout: StorageLayout,
    font_path: Option<PathBuf>,
}

impl BatchOrchestrator {
    pub fn new(layout: StorageLayout, font_path: Option<PathBuf>) -> Self {
        Self { layout, font_path }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Runs one batch to completion. Blocking; call from a blocking thread.
    pub fn run(&self, request: &GenerationRequest) -> Result<GenerationOutcome, GenerationError> {
        let run_id = generate_run_id();
        let mut run = Run::new(&run_id);

        match self.execute(&mut run, request) {
            Ok(outcome) => {
                run.transition(BatchState::Done);
                tracing::info!(
                    "Run {} wrote {} certificates to {}",
                    run_id,
                    outcome.entries.len(),
                    outcome.archive_path.display()
                );
                Ok(outcome)
            }
            Err(e) => {
                run.transition(BatchState::Failed);
                tracing::error!("Run {} failed: {}", run_id, e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        run: &mut Run<'_>,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        run.transition(BatchState::Validating);
        let batch = self.validate(request)?;

        let font = match batch.kind {
            TemplateKind::Raster => Some(FontResolution::resolve(self.font_path.as_deref())),
            TemplateKind::Document => None,
        };
        let font_fallback = font.as_ref().is_some_and(FontResolution::is_fallback);
        if let Some(FontResolution::FallbackUsed(fallback)) = &font {
            tracing::warn!(
                "Run {}: using built-in bitmap font, requested size ignored ({})",
                run.id,
                fallback.reason
            );
        }

        let renderer: Box<dyn CertificateRenderer> = match (batch.kind, font) {
            (TemplateKind::Raster, Some(font)) => Box::new(
                RasterRenderer::new(&batch.template_path, batch.placement, font)
                    .map_err(|source| render_error(&request.template_name, source))?,
            ),
            _ => Box::new(
                DocumentRenderer::load(&batch.template_path, batch.placement)
                    .map_err(|source| render_error(&request.template_name, source))?,
            ),
        };

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(self.layout.output_dir())?;
        let staged = process_records(
            run,
            &batch.records,
            &request.name_field,
            renderer.as_ref(),
            &staging,
        )?;

        run.transition(BatchState::Archiving);
        let archive = write_archive(self.layout.output_dir(), staged)?;

        let run_dir = self.layout.run_dir(&run.id);
        std::fs::create_dir_all(&run_dir)?;
        let archive_path = run_dir.join(ARCHIVE_FILE_NAME);
        if let Err(e) = archive.file.persist(&archive_path) {
            let _ = std::fs::remove_dir(&run_dir);
            return Err(GenerationError::Archive(e.error.to_string()));
        }

        Ok(GenerationOutcome {
            run_id: run.id.to_string(),
            archive_path,
            entries: archive.entries,
            font_fallback,
        })
    }

    fn validate(&self, request: &GenerationRequest) -> Result<ValidatedBatch, GenerationError> {
        let kind = TemplateKind::from_file_name(&request.template_name)
            .ok_or_else(|| GenerationError::UnsupportedFormat(request.template_name.clone()))?;
        let placement = placement_for(kind, request)?;

        let data_path = self.layout.resolve_upload(&request.data_name)?;
        let records = data::load(&data_path)?;

        let template_path = self.layout.resolve_upload(&request.template_name)?;
        if !template_path.is_file() {
            return Err(GenerationError::TemplateNotFound(request.template_name.clone()));
        }

        Ok(ValidatedBatch {
            kind,
            template_path,
            placement,
            records,
        })
    }
}

struct Run<'a> {
    id: &'a str,
    state: BatchState,
}

impl<'a> Run<'a> {
    fn new(id: &'a str) -> Self {
        Self {
            id,
            state: BatchState::Idle,
        }
    }

    fn transition(&mut self, next: BatchState) {
        match next {
            BatchState::Processing { .. } => {
                tracing::debug!("Run {}: {} -> {}", self.id, self.state, next)
            }
            _ => tracing::info!("Run {}: {} -> {}", self.id, self.state, next),
        }
        self.state = next;
    }
}

fn placement_for(kind: TemplateKind, request: &GenerationRequest) -> Result<Placement, GenerationError> {
    let x = u32::try_from(request.x)
        .map_err(|_| GenerationError::InvalidRequest(format!("x must be non-negative, got {}", request.x)))?;
    let y = u32::try_from(request.y)
        .map_err(|_| GenerationError::InvalidRequest(format!("y must be non-negative, got {}", request.y)))?;

    let font_size = request.font_size.unwrap_or_else(|| kind.default_font_size());
    if font_size <= 0 || font_size > 2000 {
        return Err(GenerationError::InvalidRequest(format!(
            "font size must be between 1 and 2000, got {}",
            font_size
        )));
    }

    let color_name = request.color.as_deref().unwrap_or_else(|| kind.default_color());
    let color = parse_color(color_name)
        .ok_or_else(|| GenerationError::InvalidRequest(format!("unknown color {:?}", color_name)))?;

    Ok(Placement {
        x,
        y,
        font_size: font_size as f32,
        color,
    })
}

fn render_error(name: &str, source: crate::render::RenderError) -> GenerationError {
    GenerationError::Render {
        name: name.to_string(),
        source,
    }
}

/// `certificado_<name>.<ext>`, with path separators replaced so the entry
/// never nests inside the archive.
pub fn certificate_file_name(name: &str, extension: &str) -> String {
    let flat: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("certificado_{}.{}", flat, extension)
}

fn process_records(
    run: &mut Run<'_>,
    records: &[Record],
    name_field: &str,
    renderer: &dyn CertificateRenderer,
    staging: &TempDir,
) -> Result<Vec<StagedCertificate>, GenerationError> {
    let total = records.len();
    let mut staged: Vec<StagedCertificate> = Vec::with_capacity(total);

    for (index, record) in records.iter().enumerate() {
        let name = record.get(name_field).ok_or_else(|| GenerationError::FieldMissing {
            row: index + 1,
            field: name_field.to_string(),
        })?;

        let bytes = renderer.render(name).map_err(|source| render_error(name, source))?;
        let mut file = NamedTempFile::new_in(staging.path())?;
        file.write_all(&bytes)?;

        let entry_name = certificate_file_name(name, renderer.extension());
        match staged.iter_mut().find(|s| s.entry_name == entry_name) {
            // Replacing the handle deletes the earlier file.
            Some(existing) => {
                tracing::debug!("Run {}: {} replaced by row {}", run.id, entry_name, index + 1);
                existing.file = file;
            }
            None => staged.push(StagedCertificate { entry_name, file }),
        }

        run.transition(BatchState::Processing {
            done: index + 1,
            total,
        });
    }

    Ok(staged)
}

struct WrittenArchive {
    file: NamedTempFile,
    entries: Vec<String>,
}

fn write_archive(
    output_dir: &Path,
    staged: Vec<StagedCertificate>,
) -> Result<WrittenArchive, GenerationError> {
    let archive = tempfile::Builder::new()
        .prefix(".archive-")
        .suffix(".zip")
        .tempfile_in(output_dir)?;
    let mut zip = ZipWriter::new(archive);
    let options = SimpleFileOptions::default().unix_permissions(0o644);

    let mut entries = Vec::with_capacity(staged.len());
    for StagedCertificate { entry_name, mut file } in staged {
        zip.start_file(entry_name.as_str(), options)?;
        file.as_file_mut().seek(SeekFrom::Start(0))?;
        std::io::copy(file.as_file_mut(), &mut zip)?;
        entries.push(entry_name);
        // `file` drops here, removing the staged certificate.
    }

    let mut file = zip.finish()?;
    file.as_file_mut().sync_all()?;
    Ok(WrittenArchive { file, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct Fixture {
        _dir: TempDir,
        orchestrator: BatchOrchestrator,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let layout = StorageLayout::new(dir.path().join("templates"), dir.path().join("out"));
            layout.ensure_dirs().unwrap();
            let orchestrator =
                BatchOrchestrator::new(layout, Some(dir.path().join("no-such-font.ttf")));
            Self {
                _dir: dir,
                orchestrator,
            }
        }

        fn layout(&self) -> &StorageLayout {
            self.orchestrator.layout()
        }

        fn png_template(&self, name: &str) {
            let path = self.layout().templates_dir().join(name);
            RgbaImage::from_pixel(400, 300, Rgba([255, 255, 255, 255]))
                .save(path)
                .unwrap();
        }

        fn data(&self, name: &str, content: &str) {
            self.layout().store_upload(name, content.as_bytes()).unwrap();
        }

        fn output_entries(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.layout().output_dir())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn request(template: &str, data: &str) -> GenerationRequest {
        GenerationRequest {
            x: 50,
            y: 50,
            font_size: Some(20),
            color: Some("black".to_string()),
            ..GenerationRequest::new(template, data)
        }
    }

    #[test]
    fn test_one_entry_per_record() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "nombre\nAna\nLuis\n");

        let outcome = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap();

        assert_eq!(outcome.entries, vec!["certificado_Ana.png", "certificado_Luis.png"]);
        assert_eq!(
            archive_names(&outcome.archive_path),
            vec!["certificado_Ana.png", "certificado_Luis.png"]
        );
        assert!(outcome.font_fallback);
        assert_eq!(
            outcome.archive_path,
            fx.layout().run_dir(&outcome.run_id).join(ARCHIVE_FILE_NAME)
        );
        // Only the run directory remains; staging and temp archive are gone.
        assert_eq!(fx.output_entries(), vec![outcome.run_id.clone()]);
    }

    #[test]
    fn test_archived_images_match_template_size() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "nombre\nAna\n");

        let outcome = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap();

        let mut archive =
            zip::ZipArchive::new(std::fs::File::open(&outcome.archive_path).unwrap()).unwrap();
        let mut entry = archive.by_name("certificado_Ana.png").unwrap();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (400, 300));
    }

    #[test]
    fn test_duplicate_names_keep_last() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "nombre\nAna\nAna\n");

        let outcome = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap();

        assert_eq!(archive_names(&outcome.archive_path), vec!["certificado_Ana.png"]);
    }

    #[test]
    fn test_missing_field_fails_without_archive() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "name\nAna\nLuis\n");

        let err = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap_err();

        match err {
            GenerationError::FieldMissing { row, field } => {
                assert_eq!(row, 1);
                assert_eq!(field, "nombre");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.output_entries().is_empty());
    }

    #[test]
    fn test_missing_field_in_later_row_fails_whole_batch() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "id,nombre\n1,Ana\n2\n");

        let err = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap_err();

        assert!(matches!(err, GenerationError::FieldMissing { row: 2, .. }));
        assert!(fx.output_entries().is_empty());
    }

    #[test]
    fn test_unsupported_extension_rejected_before_data_load() {
        let fx = Fixture::new();

        // The data file does not exist; the format check must fire first.
        let err = fx.orchestrator.run(&request("plantilla.gif", "missing.csv")).unwrap_err();

        assert!(matches!(err, GenerationError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unreadable_data_is_data_load_error() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.xlsx", "not a workbook");

        let err = fx.orchestrator.run(&request("plantilla.png", "datos.xlsx")).unwrap_err();

        assert!(matches!(err, GenerationError::DataLoad(_)));
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let fx = Fixture::new();
        fx.data("datos.csv", "nombre\nAna\n");

        let err = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap_err();

        assert!(matches!(err, GenerationError::TemplateNotFound(_)));
        assert!(fx.output_entries().is_empty());
    }

    #[test]
    fn test_invalid_placement_rejected() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "nombre\nAna\n");

        let negative = GenerationRequest {
            x: -1,
            ..request("plantilla.png", "datos.csv")
        };
        let zero_size = GenerationRequest {
            font_size: Some(0),
            ..request("plantilla.png", "datos.csv")
        };
        let bad_color = GenerationRequest {
            color: Some("#12".to_string()),
            ..request("plantilla.png", "datos.csv")
        };

        for req in [negative, zero_size, bad_color] {
            let err = fx.orchestrator.run(&req).unwrap_err();
            assert!(matches!(err, GenerationError::InvalidRequest(_)), "{err}");
        }
    }

    #[test]
    fn test_corrupt_template_fails_without_archive() {
        let fx = Fixture::new();
        fx.data("plantilla.png", "not an image");
        fx.data("datos.csv", "nombre\nAna\n");

        let err = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap_err();

        assert!(matches!(err, GenerationError::Render { .. }));
        assert!(fx.output_entries().is_empty());
    }

    #[test]
    fn test_pdf_template_produces_pdf_entries() {
        let fx = Fixture::new();
        let template = crate::render::document::render_overlay(
            "Diploma",
            &Placement {
                x: 72,
                y: 700,
                font_size: 24.0,
                color: crate::render::Rgb::BLACK,
            },
        )
        .unwrap();
        std::fs::write(fx.layout().templates_dir().join("diploma.pdf"), template).unwrap();
        fx.data("datos.csv", "nombre\nAna\nLuis\n");

        let outcome = fx
            .orchestrator
            .run(&GenerationRequest::new("diploma.pdf", "datos.csv"))
            .unwrap();

        assert_eq!(
            archive_names(&outcome.archive_path),
            vec!["certificado_Ana.pdf", "certificado_Luis.pdf"]
        );
        assert!(!outcome.font_fallback);
    }

    #[test]
    fn test_runs_do_not_share_archives() {
        let fx = Fixture::new();
        fx.png_template("plantilla.png");
        fx.data("datos.csv", "nombre\nAna\n");

        let first = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap();
        let second = fx.orchestrator.run(&request("plantilla.png", "datos.csv")).unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert!(first.archive_path.exists());
        assert!(second.archive_path.exists());
    }

    #[test]
    fn test_certificate_file_name_is_flat() {
        assert_eq!(certificate_file_name("Ana", "png"), "certificado_Ana.png");
        assert_eq!(certificate_file_name("a/b\\c", "pdf"), "certificado_a_b_c.pdf");
        assert_eq!(certificate_file_name("José Núñez", "jpg"), "certificado_José Núñez.jpg");
    }
}
