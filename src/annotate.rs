//! Persistent keyword highlighting for stored PDF and DOCX files.
//!
//! This is the explicit, opt-in counterpart to search: `dk annotate` rewrites
//! a stored document so every occurrence of the keyword carries a visible
//! marker. PDF pages get note annotations appended to `/Annots`; DOCX runs
//! whose text contains the keyword are split so the matching spans carry
//! `w:highlight` run formatting. Plain text is rejected.
//!
//! Best-effort by contract: occurrences a run-level rewrite cannot reach
//! (matches spanning run boundaries, runs with unusual structure) are left
//! unannotated rather than risking document corruption.

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use lopdf::dictionary;
use quick_xml::events::{BytesStart, BytesText, Event};
use tracing::{debug, warn};

use crate::extract::{resolve_kind, DocKind};
use crate::search::find_case_insensitive;
use crate::storage::Storage;

/// Typed annotation failures.
#[derive(Debug)]
pub enum AnnotateError {
    /// Only PDF and DOCX can carry persistent highlights.
    UnsupportedType(String),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for AnnotateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotateError::UnsupportedType(kind) => {
                write!(f, "cannot annotate {} documents", kind)
            }
            AnnotateError::Pdf(e) => write!(f, "PDF annotation failed: {}", e),
            AnnotateError::Docx(e) => write!(f, "DOCX annotation failed: {}", e),
        }
    }
}

impl std::error::Error for AnnotateError {}

/// Every case-insensitive occurrence of `keyword` in `text`, non-overlapping.
fn occurrence_ranges(text: &str, keyword: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut base = 0usize;
    while let Some((start, end)) = find_case_insensitive(&text[base..], keyword) {
        ranges.push((base + start, base + end));
        base += end;
    }
    ranges
}

// ============ PDF ============

/// Add one note annotation per keyword occurrence, per page.
///
/// Returns the rewritten bytes and the number of occurrences annotated.
/// Without glyph geometry the notes are stacked at the page margin; the
/// keyword itself travels in `/Contents`.
pub fn annotate_pdf(bytes: &[u8], keyword: &str) -> Result<(Vec<u8>, usize), AnnotateError> {
    let mut doc = lopdf::Document::load_mem(bytes).map_err(|e| AnnotateError::Pdf(e.to_string()))?;

    let mut planned: Vec<(lopdf::ObjectId, usize)> = Vec::new();
    let mut total = 0usize;
    for (page_no, page_id) in doc.get_pages() {
        let text = doc.extract_text(&[page_no]).unwrap_or_default();
        let occurrences = occurrence_ranges(&text, keyword).len();
        if occurrences > 0 {
            planned.push((page_id, occurrences));
            total += occurrences;
        }
    }

    if total == 0 {
        return Ok((bytes.to_vec(), 0));
    }

    for (page_id, occurrences) in planned {
        let mut annot_refs: Vec<lopdf::Object> = Vec::with_capacity(occurrences);
        for i in 0..occurrences {
            // Stack markers down the left margin, wrapping on long pages.
            let top = 760 - ((i as i64 * 24) % 680);
            let annot_id = doc.add_object(lopdf::dictionary! {
                "Type" => "Annot",
                "Subtype" => "Text",
                "Rect" => vec![36i64.into(), (top - 20).into(), 56i64.into(), top.into()],
                "Contents" => lopdf::Object::string_literal(format!("match: {}", keyword)),
                "Name" => "Note",
                "C" => vec![1i64.into(), 1i64.into(), 0i64.into()],
            });
            annot_refs.push(lopdf::Object::Reference(annot_id));
        }
        attach_annotations(&mut doc, page_id, annot_refs)
            .map_err(AnnotateError::Pdf)?;
    }

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| AnnotateError::Pdf(e.to_string()))?;
    Ok((out, total))
}

/// Append references to the page's `/Annots`, whether it is inline, indirect,
/// or absent.
fn attach_annotations(
    doc: &mut lopdf::Document,
    page_id: lopdf::ObjectId,
    mut annot_refs: Vec<lopdf::Object>,
) -> Result<(), String> {
    enum Target {
        Absent,
        Inline,
        Indirect(lopdf::ObjectId),
    }

    let target = {
        let page = doc
            .get_object(page_id)
            .and_then(lopdf::Object::as_dict)
            .map_err(|e| e.to_string())?;
        match page.get(b"Annots") {
            Ok(lopdf::Object::Reference(id)) => Target::Indirect(*id),
            Ok(lopdf::Object::Array(_)) => Target::Inline,
            _ => Target::Absent,
        }
    };

    match target {
        Target::Absent => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(lopdf::Object::as_dict_mut)
                .map_err(|e| e.to_string())?;
            page.set("Annots", lopdf::Object::Array(annot_refs));
        }
        Target::Inline => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(lopdf::Object::as_dict_mut)
                .map_err(|e| e.to_string())?;
            let annots = page
                .get_mut(b"Annots")
                .and_then(lopdf::Object::as_array_mut)
                .map_err(|e| e.to_string())?;
            annots.append(&mut annot_refs);
        }
        Target::Indirect(id) => {
            let annots = doc
                .get_object_mut(id)
                .and_then(lopdf::Object::as_array_mut)
                .map_err(|e| e.to_string())?;
            annots.append(&mut annot_refs);
        }
    }
    Ok(())
}

// ============ DOCX ============

/// Highlight every keyword occurrence in `word/document.xml`, copying all
/// other archive entries byte-for-byte.
pub fn annotate_docx(bytes: &[u8], keyword: &str) -> Result<(Vec<u8>, usize), AnnotateError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| AnnotateError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| AnnotateError::Docx(e.to_string()))?
        .read_to_end(&mut doc_xml)
        .map_err(|e| AnnotateError::Docx(e.to_string()))?;

    let (new_xml, occurrences) = rewrite_document_xml(&doc_xml, keyword)?;
    if occurrences == 0 {
        return Ok((bytes.to_vec(), 0));
    }

    let mut out = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut out));
        for i in 0..archive.len() {
            let is_document = {
                let entry = archive
                    .by_index(i)
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
                entry.name() == "word/document.xml"
            };
            if is_document {
                writer
                    .start_file(
                        "word/document.xml",
                        zip::write::SimpleFileOptions::default(),
                    )
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
                writer
                    .write_all(&new_xml)
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
            } else {
                let entry = archive
                    .by_index_raw(i)
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
                writer
                    .raw_copy_file(entry)
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
            }
        }
        writer
            .finish()
            .map_err(|e| AnnotateError::Docx(e.to_string()))?;
    }
    Ok((out, occurrences))
}

/// Rewrite runs whose text contains the keyword, splitting them so matching
/// spans get `w:highlight`. Returns the new XML and the occurrence count.
fn rewrite_document_xml(xml: &[u8], keyword: &str) -> Result<(Vec<u8>, usize), AnnotateError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = quick_xml::Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut occurrences = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:r" => {
                // Buffer the whole run, then decide whether to split it.
                let mut run_events: Vec<Event<'static>> = vec![Event::Start(e.into_owned())];
                loop {
                    buf.clear();
                    match reader.read_event_into(&mut buf) {
                        Ok(Event::End(end)) if end.name().as_ref() == b"w:r" => {
                            run_events.push(Event::End(end.into_owned()));
                            break;
                        }
                        Ok(Event::Eof) => {
                            return Err(AnnotateError::Docx(
                                "unterminated w:r element".to_string(),
                            ));
                        }
                        Ok(event) => run_events.push(event.into_owned()),
                        Err(e) => return Err(AnnotateError::Docx(e.to_string())),
                    }
                }
                occurrences += emit_run(&mut writer, &run_events, keyword)
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
            }
            Ok(Event::Eof) => break,
            Ok(event) => {
                writer
                    .write_event(event)
                    .map_err(|e| AnnotateError::Docx(e.to_string()))?;
            }
            Err(e) => return Err(AnnotateError::Docx(e.to_string())),
        }
        buf.clear();
    }

    Ok((writer.into_inner(), occurrences))
}

/// Write one buffered run, split around keyword matches when it has the
/// simple `[rPr] + single w:t` shape. Returns the matches annotated.
fn emit_run(
    writer: &mut quick_xml::Writer<Vec<u8>>,
    run_events: &[Event<'static>],
    keyword: &str,
) -> quick_xml::Result<usize> {
    let parsed = parse_simple_run(run_events);

    let Some((rpr_events, text)) = parsed else {
        // Unusual run shape; pass through untouched.
        for event in run_events {
            writer.write_event(event.clone())?;
        }
        return Ok(0);
    };

    let ranges = occurrence_ranges(&text, keyword);
    if ranges.is_empty() {
        for event in run_events {
            writer.write_event(event.clone())?;
        }
        return Ok(0);
    }

    let mut cursor = 0usize;
    for &(start, end) in &ranges {
        if start > cursor {
            write_run(writer, &rpr_events, &text[cursor..start], false)?;
        }
        write_run(writer, &rpr_events, &text[start..end], true)?;
        cursor = end;
    }
    if cursor < text.len() {
        write_run(writer, &rpr_events, &text[cursor..], false)?;
    }
    Ok(ranges.len())
}

/// Recognize `Start w:r, [rPr subtree], Start w:t, Text*, End w:t, End w:r`.
/// Returns the buffered rPr inner events and the run text, or `None` for any
/// other shape.
fn parse_simple_run(run_events: &[Event<'static>]) -> Option<(Vec<Event<'static>>, String)> {
    let mut rpr_events: Vec<Event<'static>> = Vec::new();
    let mut text = String::new();
    let mut index = 1; // skip Start w:r

    // Optional rPr subtree.
    if let Some(Event::Start(e)) = run_events.get(index) {
        if e.name().as_ref() == b"w:rPr" {
            index += 1;
            let mut depth = 1;
            while depth > 0 {
                let event = run_events.get(index)?;
                match event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => {
                        depth -= 1;
                        if depth == 0 {
                            index += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                rpr_events.push(event.clone());
                index += 1;
            }
        }
    }

    // Single w:t carrying the run text.
    match run_events.get(index)? {
        Event::Start(e) if e.name().as_ref() == b"w:t" => index += 1,
        _ => return None,
    }
    loop {
        match run_events.get(index)? {
            Event::Text(t) => {
                text.push_str(&t.unescape().ok()?);
                index += 1;
            }
            Event::End(e) if e.name().as_ref() == b"w:t" => {
                index += 1;
                break;
            }
            _ => return None,
        }
    }

    // Nothing but the closing w:r may remain.
    match run_events.get(index)? {
        Event::End(e) if e.name().as_ref() == b"w:r" && index == run_events.len() - 1 => {
            Some((rpr_events, text))
        }
        _ => None,
    }
}

/// Emit one `w:r` with the given properties and text, optionally highlighted.
fn write_run(
    writer: &mut quick_xml::Writer<Vec<u8>>,
    rpr_events: &[Event<'static>],
    text: &str,
    highlight: bool,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("w:r")))?;

    if highlight || !rpr_events.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("w:rPr")))?;
        for event in rpr_events {
            writer.write_event(event.clone())?;
        }
        if highlight {
            let mut el = BytesStart::new("w:highlight");
            el.push_attribute(("w:val", "yellow"));
            writer.write_event(Event::Empty(el))?;
        }
        writer.write_event(Event::End(quick_xml::events::BytesEnd::new("w:rPr")))?;
    }

    let mut t = BytesStart::new("w:t");
    t.push_attribute(("xml:space", "preserve"));
    writer.write_event(Event::Start(t))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(quick_xml::events::BytesEnd::new("w:t")))?;

    writer.write_event(Event::End(quick_xml::events::BytesEnd::new("w:r")))?;
    Ok(())
}

// ============ CLI ============

/// Run the annotate command: rewrite a stored PDF/DOCX with highlights.
pub async fn run_annotate(storage: &dyn Storage, filename: &str, keyword: &str) -> Result<()> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        bail!("annotate requires a non-empty keyword");
    }

    let bytes = storage
        .retrieve(filename)
        .await
        .with_context(|| format!("cannot annotate missing file {}", filename))?;

    let kind = resolve_kind(&bytes, Some(filename));
    let (rewritten, occurrences) = match kind {
        Some(DocKind::Pdf) => annotate_pdf(&bytes, keyword)?,
        Some(DocKind::Docx) => annotate_docx(&bytes, keyword)?,
        Some(DocKind::Text) => {
            return Err(AnnotateError::UnsupportedType("plain text".to_string()).into());
        }
        None => {
            return Err(AnnotateError::UnsupportedType("unrecognized".to_string()).into());
        }
    };

    if occurrences == 0 {
        debug!(file = filename, keyword, "no occurrences, file untouched");
        println!("annotate {}", filename);
        println!("  occurrences: 0");
        println!("ok");
        return Ok(());
    }

    if let Err(e) = storage.store(filename, &rewritten).await {
        warn!(file = filename, error = %e, "failed to store annotated copy");
        return Err(e);
    }

    println!("annotate {}", filename);
    println!("  occurrences: {}", occurrences);
    println!("ok");
    Ok(())
}
