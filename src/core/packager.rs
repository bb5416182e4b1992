//! Batch packaging: contiguous chunks of work units into .apkg files.
//!
//! Runs strictly after all units settle and strictly sequentially across
//! chunks, since each chunk drives one archive builder. The packager
//! re-reads the original row order; it never depends on completion order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::ApkgBuilder;
use crate::config::PipelineOptions;
use crate::domain::{ProgressEvent, ProgressSink, WorkUnit};
use crate::error::PackagingError;
use crate::text;

/// Derive the output filename for one part. The base name is untouched
/// for a single part; otherwise `.partK` (zero-padded to the digit width
/// of the part count) is inserted before the extension.
pub fn derive_batch_filename(base: &Path, part_idx: usize, total_parts: usize) -> PathBuf {
    if total_parts <= 1 {
        return base.to_path_buf();
    }
    let ext = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".apkg".to_string());
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let width = total_parts.to_string().len();
    base.with_file_name(format!("{stem}.part{:0width$}{ext}", part_idx + 1))
}

/// Card back HTML: colorized back text, then the sound reference, then a
/// bounded image tag.
fn back_html(unit: &WorkUnit) -> String {
    let mut pieces = vec![text::colorize_paren_term(&unit.row.back)];
    if let Some(mp3) = &unit.mp3_name {
        pieces.push(format!("[sound:{mp3}]"));
    }
    if let Some(img) = unit.image_names.first() {
        pieces.push(format!(
            "<div><img style=\"max-width:480px; max-height:320px; width:auto; height:auto;\" \
             src=\"{img}\"></div>"
        ));
    }
    pieces.join(" ")
}

/// Partition the settled units into batches and emit one archive per
/// batch. Any read, build, or write failure aborts the run.
pub fn pack(
    units: &[WorkUnit],
    opts: &PipelineOptions,
    sink: &dyn ProgressSink,
) -> Result<Vec<PathBuf>, PackagingError> {
    let batch_size = opts.batch_size.max(1);
    let chunks: Vec<&[WorkUnit]> = units.chunks(batch_size).collect();
    let parts = chunks.len();

    sink.emit(ProgressEvent::PackStart {
        total: units.len(),
        parts,
        batch_size,
    });

    let mut outputs = Vec::with_capacity(parts);
    for (part_idx, part) in chunks.into_iter().enumerate() {
        let out_file = derive_batch_filename(&opts.output, part_idx, parts);
        sink.emit(ProgressEvent::PackPart {
            part_index: part_idx,
            parts,
            filename: out_file.clone(),
        });

        let deck_name = if parts > 1 {
            format!("{} (Part {}/{})", opts.deck_name, part_idx + 1, parts)
        } else {
            opts.deck_name.clone()
        };
        let mut deck = ApkgBuilder::new(&deck_name);

        // Media set: union of the chunk's attachments, deduplicated,
        // insertion order preserved.
        let mut seen = HashSet::new();
        for unit in part {
            let names = unit.mp3_name.iter().chain(unit.image_names.iter());
            for name in names {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let path = opts.media_dir.join(name);
                let bytes = std::fs::read(&path)
                    .map_err(|source| PackagingError::MediaRead { path, source })?;
                deck.add_media(name, bytes);
            }
        }

        for unit in part {
            deck.add_card(&unit.row.front, &back_html(unit));
        }

        let bytes = deck.save().map_err(PackagingError::Archive)?;
        std::fs::write(&out_file, bytes).map_err(|source| PackagingError::Write {
            path: out_file.clone(),
            source,
        })?;

        info!(part = part_idx + 1, parts, file = %out_file.display(), "Wrote deck part");
        outputs.push(out_file);
    }

    Ok(outputs)
}
