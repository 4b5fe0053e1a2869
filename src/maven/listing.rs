use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::util::transport::{Document, DocumentKind};

lazy_static! {
    static ref PRE_REGEX: Regex = Regex::new(r"(?is)<pre\b[^>]*>(.*?)</pre\s*>").unwrap();
    static ref TABLE_REGEX: Regex = Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").unwrap();
    static ref ROW_REGEX: Regex = Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap();
    static ref CELL_REGEX: Regex = Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]\s*>").unwrap();
    static ref ANCHOR_REGEX: Regex = Regex::new(r"(?is)<a\b([^>]*)>.*?</a\s*>").unwrap();
    static ref HREF_REGEX: Regex = Regex::new(r#"(?is)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#).unwrap();
    static ref TAG_REGEX: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
}

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("unrecognized directory listing: {0}")]
    Unrecognized(String),
    #[error("no suitable directory listing parser found for {url}: {}", describe_failures(.failures))]
    NoSuitableParser { url: Url, failures: Vec<ListingError> },
}

fn describe_failures(failures: &[ListingError]) -> String {
    failures.iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extracts the child links from a fetched directory index. Links are absolute, and they are all
///  below the listed directory: anything pointing elsewhere (parent directory, other hosts, sort
///  links) is dropped. Directory links always end with '/'.
///
/// Implementations fail on documents they do not recognize rather than returning a partial result.
pub trait DirectoryListingParser: Send + Sync {
    fn parse(&self, base: &Url, document: &Document) -> Result<Vec<Url>, ListingError>;
}

/// Tries each registered format in turn and returns the first successful result
pub struct CompositeDirectoryListingParser {
    parsers: Vec<Box<dyn DirectoryListingParser>>,
}
impl CompositeDirectoryListingParser {
    pub fn new(parsers: Vec<Box<dyn DirectoryListingParser>>) -> CompositeDirectoryListingParser {
        CompositeDirectoryListingParser { parsers }
    }
}
impl Default for CompositeDirectoryListingParser {
    fn default() -> Self {
        CompositeDirectoryListingParser::new(vec![
            Box::new(PreformattedListingParser),
            Box::new(TableListingParser),
        ])
    }
}
impl DirectoryListingParser for CompositeDirectoryListingParser {
    fn parse(&self, base: &Url, document: &Document) -> Result<Vec<Url>, ListingError> {
        let mut failures = vec![];
        for parser in &self.parsers {
            match parser.parse(base, document) {
                Ok(links) => return Ok(links),
                Err(e) => failures.push(e),
            }
        }
        Err(ListingError::NoSuitableParser { url: base.clone(), failures })
    }
}

/// The index layout of Maven Central, nginx `autoindex` and many repository managers: a single
///  `<pre>` block alternating between a link and a text of the form `<date> <time> <size>`, where
///  the size is `-` for directories.
pub struct PreformattedListingParser;
impl DirectoryListingParser for PreformattedListingParser {
    fn parse(&self, base: &Url, document: &Document) -> Result<Vec<Url>, ListingError> {
        let html = html_text(document)?;
        let content = single_block(&PRE_REGEX, html, "<pre>")?;

        let anchors: Vec<(usize, usize, &str)> = ANCHOR_REGEX.captures_iter(content)
            .filter_map(|c| {
                let whole = c.get(0)?;
                Some((whole.start(), whole.end(), c.get(1)?.as_str()))
            })
            .collect();

        if let Some((first_start, _, _)) = anchors.first() {
            let leading = &content[..*first_start];
            if !leading.trim().is_empty() {
                return Err(ListingError::Unrecognized(format!("expected a link element first, got text {:?}", leading.trim())));
            }
        }

        let mut result = vec![];
        for (idx, (_, end, attributes)) in anchors.iter().enumerate() {
            let text_end = anchors.get(idx + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(content.len());
            let text = &content[*end..text_end];
            if text.contains('<') {
                return Err(ListingError::Unrecognized(format!("expected text after link, got markup {:?}", text.trim())));
            }

            let link = match anchored_link(base, attributes)? {
                Some(link) => link,
                None => continue,
            };

            let text = decode_entities(text);
            let pieces: Vec<&str> = text.split_whitespace().collect();
            if pieces.len() != 3 {
                return Err(ListingError::Unrecognized(format!("expected 3 pieces, got {} in {:?}", pieces.len(), text.trim())));
            }

            result.push(as_listed(link, pieces[2]));
        }
        Ok(result)
    }
}

/// Apache `FancyIndexing` / HTML table layouts: one `<tr>` per entry with the link in one cell,
///  followed by cells for the modification date and the size.
pub struct TableListingParser;
impl DirectoryListingParser for TableListingParser {
    fn parse(&self, base: &Url, document: &Document) -> Result<Vec<Url>, ListingError> {
        let html = html_text(document)?;
        let table = single_block(&TABLE_REGEX, html, "<table>")?;

        let mut result = vec![];
        for row in ROW_REGEX.captures_iter(table) {
            let cells: Vec<&str> = CELL_REGEX.captures_iter(&row[1])
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();

            let link_cell = cells.iter()
                .position(|cell| ANCHOR_REGEX.is_match(cell));
            let link_cell = match link_cell {
                Some(idx) => idx,
                None => continue, // header or separator row
            };

            let anchor = ANCHOR_REGEX.captures(cells[link_cell])
                .ok_or_else(|| ListingError::Unrecognized("link cell without link".to_string()))?;
            let link = match anchored_link(base, &anchor[1])? {
                Some(link) => link,
                None => continue,
            };

            let details = &cells[link_cell + 1..];
            if details.len() < 2 {
                return Err(ListingError::Unrecognized(format!("expected date and size cells for {}, got {} cells", link, details.len())));
            }
            let size = decode_entities(&TAG_REGEX.replace_all(details[1], ""));
            result.push(as_listed(link, size.trim()));
        }
        Ok(result)
    }
}

fn html_text(document: &Document) -> Result<&str, ListingError> {
    match document.kind {
        DocumentKind::Html => Ok(&document.text),
        DocumentKind::Xml => Err(ListingError::Unrecognized("not an HTML document".to_string())),
    }
}

fn single_block<'a>(regex: &Regex, html: &'a str, name: &str) -> Result<&'a str, ListingError> {
    let mut blocks = regex.captures_iter(html)
        .filter_map(|c| c.get(1));
    match (blocks.next(), blocks.next()) {
        (Some(block), None) => Ok(block.as_str()),
        (None, _) => Err(ListingError::Unrecognized(format!("no {} element", name))),
        (Some(_), Some(_)) => Err(ListingError::Unrecognized(format!("more than one {} element", name))),
    }
}

/// Resolves a link's `href` against the listed directory. Returns `None` for links that do not
///  point strictly below `base`, i.e. this keeps the crawl inside the repository's own tree.
fn anchored_link(base: &Url, anchor_attributes: &str) -> Result<Option<Url>, ListingError> {
    let href = HREF_REGEX.captures(anchor_attributes)
        .and_then(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| decode_entities(m.as_str()))
        .ok_or_else(|| ListingError::Unrecognized(format!("link without href: <a{}>", anchor_attributes)))?;

    let link = base.join(href.trim())
        .map_err(|e| ListingError::Unrecognized(format!("invalid link {:?}: {}", href, e)))?;

    if !link.as_str().starts_with(base.as_str())
        || link.as_str() == base.as_str()
        || link.query().is_some()
        || link.fragment().is_some() {
        return Ok(None);
    }
    Ok(Some(link))
}

/// Not all listings mark directories with a '/' suffix - a missing size marks them as well
fn as_listed(mut link: Url, size: &str) -> Url {
    let is_directory = size.is_empty() || size == "-";
    if is_directory && !link.path().ends_with('/') {
        let path = format!("{}/", link.path());
        link.set_path(&path);
        link
    }
    else {
        link
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
