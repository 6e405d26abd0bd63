//! HTML pages of the HTTP front.
//!
//! Links are relative to `/images/{doc_id}/`, so the pages work behind any
//! path prefix a reverse proxy adds.

use crate::imaging::IMAGE_FORMAT;

/// Marker between page number and extension of thumbnail file names.
pub const THUMBNAIL_INFIX: &str = ".thumb";

/// Page embedding a single full-size image. `query` is forwarded to the image.
pub fn wrapper_page(doc_id: &str, page: u32, query: Option<&str>) -> String {
    let query = query
        .filter(|q| !q.is_empty())
        .map(|q| format!("?{}", q))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Page {page}</title>
</head>
<body>
  <div style="text-align: center; width: 100%;">
    <img src="{page}.{ext}{query}" alt="Page {page} of {doc}">
  </div>
</body>
</html>
"#,
        page = page,
        ext = IMAGE_FORMAT,
        query = escape_html(&query),
        doc = escape_html(doc_id),
    )
}

/// Page listing thumbnails of `pages`, each linking to its wrapper page.
pub fn index_page(doc_id: &str, pages: &[u32]) -> String {
    let title = match (pages.first(), pages.last()) {
        (Some(first), Some(last)) if first != last => format!("Pages {} - {}", first, last),
        (Some(first), _) => format!("Page {}", first),
        _ => "Pages".to_string(),
    };

    let mut labels = String::new();
    let mut cells = String::new();
    for page in pages {
        labels.push_str(&format!(
            "      <td style=\"text-align: center; font-family: Verdana, sans-serif; font-size: 10pt;\">Page {}</td>\n",
            page
        ));
        cells.push_str(&format!(
            "      <td style=\"padding: 5px; vertical-align: middle;\"><a href=\"{page}\" target=\"page-image\"><img title=\"View page {page} in full resolution\" src=\"{page}{infix}.{ext}\"></a></td>\n",
            page = page,
            infix = THUMBNAIL_INFIX,
            ext = IMAGE_FORMAT,
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
</head>
<body>
  <h1 style="font-family: Verdana, sans-serif; font-size: 12pt;">{doc}</h1>
  <table style="border-width: 0px; width: 100%;">
    <tr>
{labels}    </tr>
    <tr>
{cells}    </tr>
  </table>
</body>
</html>
"#,
        title = title,
        doc = escape_html(doc_id),
        labels = labels,
        cells = cells,
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
