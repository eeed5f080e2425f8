use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::UNKNOWN;

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
// Tokens fully wrapped in parentheses are credit annotations, not names.
static ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(.+\)$").unwrap());

// A comma inside one text fragment splits a generational suffix off its
// owner; the split token keeps its leading space.
const SUFFIX_TOKEN: &str = " Jr.";

/// Names credited under one role, exactly `arity` long: overflow truncated,
/// shortfall padded with the sentinel. `role_pattern` is the href marker of
/// the role's label anchor (e.g. `Director&`).
pub fn extract_role(doc: &Html, role_pattern: &str, arity: usize) -> Vec<String> {
    let mut names = match label_anchor(doc, role_pattern).and_then(|a| first_cell_after(doc, a)) {
        Some(cell) => strip_annotations(merge_suffixes(cell_tokens(cell))),
        None => Vec::new(),
    };
    names.resize(arity, UNKNOWN.to_string());
    names
}

fn label_anchor<'a>(doc: &'a Html, role_pattern: &str) -> Option<ElementRef<'a>> {
    doc.select(&ANCHOR_SEL)
        .find(|a| a.value().attr("href").is_some_and(|h| h.contains(role_pattern)))
}

/// First `<td>` following the anchor in document order: the label anchor
/// sits inside the label cell, so this lands on the adjacent names cell.
fn first_cell_after<'a>(doc: &'a Html, anchor: ElementRef<'a>) -> Option<ElementRef<'a>> {
    doc.tree
        .root()
        .descendants()
        .skip_while(|n| n.id() != anchor.id())
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
}

fn cell_tokens(cell: ElementRef) -> Vec<String> {
    let joined = cell
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    joined
        .replace('*', "")
        .split(',')
        .map(str::to_string)
        .collect()
}

fn merge_suffixes(tokens: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(tokens.len());
    let mut pending = String::new();
    for token in tokens {
        if token == SUFFIX_TOKEN {
            // Flushes immediately; a suffix never attaches to a name that
            // was already flushed, so an empty buffer yields a bare ", Jr.".
            pending.push(',');
            pending.push_str(&token);
            merged.push(std::mem::take(&mut pending));
        } else {
            if !pending.is_empty() {
                merged.push(std::mem::take(&mut pending));
            }
            pending = token;
        }
    }
    if !pending.is_empty() {
        merged.push(pending);
    }
    merged
}

fn strip_annotations(tokens: Vec<String>) -> Vec<String> {
    tokens
        .into_iter()
        .filter(|t| !ANNOTATION_RE.is_match(t))
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    fn credit_row(role: &str, cell: &str) -> String {
        format!(
            "<table><tr>\
             <td><a href=\"/people/chart/?view={role}&id=x.htm\">{role}:</a></td>\
             <td>{cell}</td>\
             </tr></table>"
        )
    }

    #[test]
    fn missing_role_pads_to_arity() {
        let d = doc("<html><body><b>Title</b></body></html>");
        let names = extract_role(&d, "Director&", 2);
        assert_eq!(names, vec![UNKNOWN, UNKNOWN]);
    }

    #[test]
    fn names_from_label_cell() {
        let d = doc(&credit_row(
            "Writer",
            "<a href=\"/people/?id=a.htm\">Jane Roe</a><br>\
             <a href=\"/people/?id=b.htm\">John Doe</a>",
        ));
        let names = extract_role(&d, "Writer&", 3);
        assert_eq!(names, vec!["Jane Roe", "John Doe", UNKNOWN]);
    }

    #[test]
    fn suffix_merges_onto_preceding_name() {
        let d = doc(&credit_row("Producer", "Michael Deeley, Jr.<br>Jane Roe"));
        let names = extract_role(&d, "Producer&", 6);
        assert_eq!(names[0], "Michael Deeley, Jr.");
        assert_eq!(names[1], "Jane Roe");
        assert_eq!(names[2], UNKNOWN);
    }

    #[test]
    fn annotation_tokens_dropped_in_order() {
        let d = doc(&credit_row(
            "Actor",
            "Jane Roe<br>(uncredited)<br>John Doe",
        ));
        let names = extract_role(&d, "Actor&", 6);
        assert_eq!(names[0], "Jane Roe");
        assert_eq!(names[1], "John Doe");
        assert_eq!(names[2], UNKNOWN);
    }

    #[test]
    fn star_markers_removed() {
        let d = doc(&credit_row("Actor", "Harrison Ford*<br>Rutger Hauer"));
        let names = extract_role(&d, "Actor&", 6);
        assert_eq!(names[0], "Harrison Ford");
        assert_eq!(names[1], "Rutger Hauer");
    }

    #[test]
    fn overflow_truncated_to_arity() {
        let d = doc(&credit_row("Director", "A<br>B<br>C<br>D"));
        let names = extract_role(&d, "Director&", 2);
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn solo_role_yields_single_name() {
        let d = doc(&credit_row("Cinematographer", "Jordan Cronenweth"));
        let names = extract_role(&d, "Cinematographer&", 1);
        assert_eq!(names, vec!["Jordan Cronenweth"]);
    }

    #[test]
    fn merge_suffixes_leading_suffix_flushes_alone() {
        let tokens = vec![" Jr.".to_string(), "Jane Roe".to_string()];
        assert_eq!(merge_suffixes(tokens), vec![", Jr.", "Jane Roe"]);
    }

    #[test]
    fn merge_suffixes_consecutive_suffixes_do_not_stack() {
        let tokens = vec![
            "Sammy Davis".to_string(),
            " Jr.".to_string(),
            " Jr.".to_string(),
        ];
        assert_eq!(merge_suffixes(tokens), vec!["Sammy Davis, Jr.", ", Jr."]);
    }

    #[test]
    fn merge_suffixes_basic() {
        let tokens = vec![
            "John Doe".to_string(),
            " Jr.".to_string(),
            "Jane Roe".to_string(),
        ];
        assert_eq!(merge_suffixes(tokens), vec!["John Doe, Jr.", "Jane Roe"]);
    }
}
