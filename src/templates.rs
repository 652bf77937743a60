//! Sample documents for tests and the CLI demo.
//!
//! Each one exercises a different part of pagination: explicit breaks,
//! long flowing text, atomic tables and figures.

/// Title page, then two chapters, each forced onto a new page.
pub fn chaptered_template() -> &'static str {
    r##"
<h1 class="text-center">Field Notes</h1>
<p class="text-center italic">A short report in two chapters</p>
<break/>
<h2>Chapter 1: Setup</h2>
<p>The survey ran for six weeks across three sites. Each site was visited
twice a week and readings were logged on paper before being transcribed.</p>
<ul>
    <li>North ridge, <strong>elevation 840m</strong></li>
    <li>River bend, sheltered</li>
    <li>Old quarry, exposed to wind</li>
</ul>
<div class="page-break"></div>
<h2>Chapter 2: Results</h2>
<p>Readings were consistent between visits. The quarry site showed the widest
spread, which matches its exposure.</p>
<blockquote>Numbers are averages over both weekly visits.</blockquote>
"##
}

/// Invoice with a table that is always kept whole.
pub fn invoice_template() -> &'static str {
    r##"
<h1 style="color: #1a365d">Invoice #2026-014</h1>
<p><strong>From:</strong> Acme Corp, 123 Business St, New York</p>
<p><strong>To:</strong> Client Inc, 456 Client Ave, Los Angeles</p>
<table>
    <tr><th>Item</th><th>Qty</th><th>Price</th><th>Total</th></tr>
    <tr><td>Web Development</td><td>40</td><td>$150.00</td><td>$6,000.00</td></tr>
    <tr><td>Design Services</td><td>20</td><td>$125.00</td><td>$2,500.00</td></tr>
    <tr><td>Hosting (Annual)</td><td>1</td><td>$500.00</td><td>$500.00</td></tr>
</table>
<p class="text-right font-bold">Total: $9,000.00</p>
<hr>
<p class="text-xs">Payment due within 30 days.</p>
"##
}

/// A heading followed by `paragraphs` paragraphs of filler text, long enough
/// to span several pages.
pub fn long_article(paragraphs: usize) -> String {
    const FILLER: &str = "Pagination splits flowing content at the last point that \
        still fits on the page and carries the rest over, keeping each element's \
        wrapper so styling continues on the next page.";
    let mut html = String::from("<h1>Long Article</h1>\n");
    for i in 1..=paragraphs {
        html.push_str(&format!("<p>{i}. {FILLER} {FILLER}</p>\n"));
    }
    html
}

/// A figure that must not be split, sandwiched between paragraphs.
pub fn figure_template(img_src: &str) -> String {
    format!(
        r##"
<p>The chart below summarises the quarter.</p>
<img src="{img_src}" width="400" height="300">
<p style="page-break-inside: avoid">Figure 1. Monthly totals, kept together with its caption.</p>
<pre>
region   q1    q2
north    12    15
south     9    11
</pre>
"##
    )
}

/// Minimal template for quick testing.
pub fn minimal_template() -> &'static str {
    "<p>Hello, folio!</p>"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;
    use crate::segment::segment;

    #[test]
    fn chapters_become_sections() {
        let sections = segment(&parse_document(chaptered_template()));
        assert_eq!(sections.len(), 3);
        assert!(sections.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn templates_parse() {
        for html in [invoice_template(), minimal_template()] {
            assert!(!parse_document(html).text_content().trim().is_empty());
        }
        assert!(long_article(3).matches("<p>").count() == 3);
        let fig = parse_document(&figure_template("chart.png"));
        assert!(fig.children().iter().any(|n| matches!(n, crate::dom::ContentNode::Leaf(_))));
    }
}
