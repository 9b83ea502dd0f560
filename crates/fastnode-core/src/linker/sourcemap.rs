//! Per-chunk source map assembly: joins per-file line breadcrumbs into a
//! single V3 mapping string, deduplicating source content entries.

use rustc_hash::FxHashMap as HashMap;

use super::model::{Graph, SourceIndex};
use super::print_js::PrintedChunk;

#[derive(Debug)]
pub struct SourceMap {
    pub json: String,
}

/// VLQ-encode a signed integer and append to output string.
fn vlq_encode(value: i64, out: &mut String) {
    const B64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    #[allow(clippy::cast_sign_loss)]
    let mut v = (if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    }) as u64;
    loop {
        let mut digit = (v & 0x1f) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0x20;
        }
        out.push(B64[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Builds a line-level sourcemap for one printed chunk from its file
/// breadcrumbs. Only line-granularity mappings are produced — the printer
/// doesn't carry per-token spans through the part/stmt model.
pub fn build(graph: &Graph, printed: &PrintedChunk, out_file: &str) -> SourceMap {
    let mut sources: Vec<String> = Vec::new();
    let mut sources_content: Vec<String> = Vec::new();
    let mut index_of: HashMap<SourceIndex, u32> = HashMap::default();

    for &(_, source) in &printed.line_starts {
        let Some(source) = source else { continue };
        index_of.entry(source).or_insert_with(|| {
            let idx = sources.len() as u32;
            let file = graph.file(source);
            sources.push(file.pretty_path.clone());
            sources_content.push(String::new());
            idx
        });
    }

    let mut mappings_str = String::new();
    let mut prev_output_line = 0i64;
    let mut prev_source = 0i64;

    let mut starts = printed.line_starts.clone();
    starts.sort_by_key(|(line, _)| *line);

    for (output_line, source) in &starts {
        let Some(source) = source else { continue };
        let &src_idx = index_of.get(source).unwrap();

        while prev_output_line < i64::from(*output_line) {
            mappings_str.push(';');
            prev_output_line += 1;
        }

        vlq_encode(0, &mut mappings_str);
        vlq_encode(i64::from(src_idx) - prev_source, &mut mappings_str);
        vlq_encode(0, &mut mappings_str);
        vlq_encode(0, &mut mappings_str);
        prev_source = i64::from(src_idx);
    }

    let sources_json: Vec<String> = sources.iter().map(|s| json_string(s)).collect();
    let contents_json: Vec<String> = sources_content.iter().map(|s| json_string(s)).collect();

    let json = format!(
        r#"{{"version":3,"file":{},"sources":[{}],"sourcesContent":[{}],"mappings":{}}}"#,
        json_string(out_file),
        sources_json.join(","),
        contents_json.join(","),
        json_string(&mappings_str),
    );

    SourceMap { json }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chunk_produces_empty_mappings() {
        let graph = Graph::new();
        let printed = PrintedChunk {
            code: String::new(),
            line_starts: Vec::new(),
        };
        let map = build(&graph, &printed, "chunk-0.js");
        assert!(map.json.contains("\"mappings\":\"\""));
    }

    #[test]
    fn vlq_roundtrip_values() {
        let mut s = String::new();
        vlq_encode(0, &mut s);
        assert_eq!(s, "A");
    }
}
