use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::normalize::LabelMatcher;
use crate::schema::{Field, RecordFields, RecordLink};
use crate::{Error, Result};

/// Info group blocks on a work page.
const INFO_GROUP_SELECTOR: &str = r#"div.wi_body[style="width:100%"]"#;
/// The listing table on a category page.
pub(crate) const LISTING_SELECTOR: &str = r#"table[width="100%"]"#;

/// What a work page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub fields: RecordFields,
    /// Number of info group blocks found. Zero means the page structure was not recognized.
    pub blocks: usize,
}

/// Extracts every schema field it can recognize from a work page.
///
/// Rows of every info group are matched against `schema`; a later block overwrites
/// a field found in an earlier one. Fields never matched stay absent.
pub fn extract(html: &str, schema: &[Field], matcher: &LabelMatcher) -> Result<Extraction> {
    let doc = Html::parse_document(html);

    let group_selector = create_selector(INFO_GROUP_SELECTOR)?;
    let row_selector = create_selector("tr")?;
    let label_selector = create_selector("th")?;
    let value_selector = create_selector("td")?;

    let mut extraction = Extraction::default();
    for group in doc.select(&group_selector) {
        extraction.blocks += 1;
        let mut rows = 0;
        for row in group.select(&row_selector) {
            rows += 1;
            // Partial rows are common, skip them.
            let (Some(label), Some(value)) = (
                row.select(&label_selector).next(),
                row.select(&value_selector).next(),
            ) else {
                continue;
            };

            if let Some(field) = matcher.normalize(&stripped_text(label), schema) {
                extraction.fields.set(field, stripped_text(value));
            }
        }
        debug!(
            block = extraction.blocks,
            rows,
            found = extraction.fields.found(),
            "Scraped info group"
        );
    }

    if extraction.blocks == 0 {
        warn!("Couldn't find any info groups. The page structure might have changed.");
    }
    Ok(extraction)
}

/// Collects the record links of a listing page, at most `limit` of them.
///
/// Relative hrefs are resolved against `site_root`. The anchor's `title` is the
/// record name, falling back to its text. An unrecognized page yields no links.
pub fn listing_links(html: &str, site_root: &Url, limit: usize) -> Result<Vec<RecordLink>> {
    let doc = Html::parse_document(html);

    let table_selector = create_selector(LISTING_SELECTOR)?;
    let link_selector = create_selector("a")?;

    let Some(table) = doc.select(&table_selector).next() else {
        return Ok(Vec::new());
    };

    let mut links = Vec::new();
    for anchor in table.select(&link_selector).take(limit) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = match site_root.join(href) {
            Ok(url) => url,
            Err(e) => {
                warn!(href, "Skipping unresolvable link: {e}");
                continue;
            }
        };
        let name = anchor
            .value()
            .attr("title")
            .map(str::to_owned)
            .unwrap_or_else(|| stripped_text(anchor));
        links.push(RecordLink { name, url });
    }
    Ok(links)
}

/// Concatenates the element's text nodes, each one trimmed.
fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_page(groups: &[&str]) -> String {
        let body: String = groups
            .iter()
            .map(|rows| format!(r#"<div class="wi_body" style="width:100%"><table>{rows}</table></div>"#))
            .collect();
        format!("<html><body>{body}</body></html>")
    }

    #[test]
    fn every_schema_field_is_present() {
        let page = work_page(&[
            "<tr><th>Work Title</th><td> Sonata in D </td></tr>\
             <tr><th>Key</th><td>D major</td></tr>",
        ]);
        let extraction = extract(&page, &Field::ALL, &LabelMatcher::default()).unwrap();

        assert_eq!(extraction.blocks, 1);
        assert_eq!(extraction.fields.iter().count(), Field::COUNT);
        assert_eq!(extraction.fields.get(Field::WorkTitle), Some("Sonata in D"));
        assert_eq!(extraction.fields.get(Field::Key), Some("D major"));
        assert_eq!(extraction.fields.get(Field::Composer), None);
        assert_eq!(extraction.fields.found(), 2);
    }

    #[test]
    fn split_captions_flatten_to_schema_names() {
        let page = work_page(&[
            "<tr><th>Year/Date of Composition<br><span>Y/D of Comp.</span></th>\
             <td>1720<br>\n ca.</td></tr>",
        ]);
        let extraction = extract(&page, &Field::ALL, &LabelMatcher::default()).unwrap();
        assert_eq!(extraction.fields.get(Field::CompositionDate), Some("1720ca."));
    }

    #[test]
    fn later_block_overwrites_earlier() {
        let page = work_page(&[
            "<tr><th>Composer</th><td>Unknown</td></tr><tr><th>Key</th><td>G minor</td></tr>",
            "<tr><th>Composer</th><td>Telemann, Georg Philipp</td></tr>",
        ]);
        let extraction = extract(&page, &Field::ALL, &LabelMatcher::default()).unwrap();
        assert_eq!(extraction.blocks, 2);
        assert_eq!(extraction.fields.get(Field::Composer), Some("Telemann, Georg Philipp"));
        assert_eq!(extraction.fields.get(Field::Key), Some("G minor"));
    }

    #[test]
    fn partial_and_unknown_rows_are_skipped() {
        let page = work_page(&[
            "<tr><th>Key</th></tr>\
             <tr><td>orphan value</td></tr>\
             <tr><th>Librettist</th><td>Someone</td></tr>\
             <tr><th>Piece Style</th><td>Baroque</td></tr>",
        ]);
        let extraction = extract(&page, &Field::ALL, &LabelMatcher::default()).unwrap();
        assert_eq!(extraction.fields.found(), 1);
        assert_eq!(extraction.fields.get(Field::PieceStyle), Some("Baroque"));
    }

    #[test]
    fn unrecognized_page_is_empty_not_an_error() {
        let page = r#"<html><body><div class="wi_body"><table>
            <tr><th>Key</th><td>C</td></tr></table></div></body></html>"#;
        let extraction = extract(page, &Field::ALL, &LabelMatcher::default()).unwrap();
        assert_eq!(extraction.blocks, 0);
        assert_eq!(extraction.fields, RecordFields::default());
    }

    #[test]
    fn listing_links_resolve_against_site_root() {
        let root = Url::parse("https://imslp.org").unwrap();
        let page = r#"<html><body>
            <table><tr><td><a href="/wiki/Elsewhere">nav</a></td></tr></table>
            <table width="100%"><tr><td>
                <a href="/wiki/Sonata_in_D" title="Sonata in D">Sonata</a>
                <a>no href</a>
                <a href="/wiki/Suite">Suite in G</a>
            </td></tr></table>
        </body></html>"#;

        let links = listing_links(page, &root, 300).unwrap();
        assert_eq!(
            links,
            vec![
                RecordLink {
                    name: "Sonata in D".into(),
                    url: Url::parse("https://imslp.org/wiki/Sonata_in_D").unwrap(),
                },
                RecordLink {
                    name: "Suite in G".into(),
                    url: Url::parse("https://imslp.org/wiki/Suite").unwrap(),
                },
            ]
        );
    }

    #[test]
    fn listing_links_are_capped() {
        let root = Url::parse("https://imslp.org").unwrap();
        let anchors: String = (0..10)
            .map(|i| format!(r#"<a href="/wiki/W{i}" title="W{i}">W{i}</a>"#))
            .collect();
        let page = format!(r#"<table width="100%"><tr><td>{anchors}</td></tr></table>"#);

        let links = listing_links(&page, &root, 3).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[2].name, "W2");
    }

    #[test]
    fn missing_listing_table_yields_nothing() {
        let root = Url::parse("https://imslp.org").unwrap();
        let links = listing_links("<html><body><p>gone</p></body></html>", &root, 300).unwrap();
        assert!(links.is_empty());
    }
}
