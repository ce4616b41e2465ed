pub mod candidates;
pub mod normalize;
pub mod record;
pub mod schema;

use rayon::prelude::*;

use crate::dom::Document;
use crate::error::DropReason;
use candidates::Candidate;
use record::DetailPage;

/// Parse every detail page on the rayon pool. Output order follows `candidates`.
pub fn parse_details(
    candidates: &[Candidate],
    docs: &[Option<Document>],
) -> Vec<Result<DetailPage, DropReason>> {
    candidates
        .par_iter()
        .zip(docs.par_iter())
        .map(|(c, doc)| record::parse_detail(c, doc.as_ref()))
        .collect()
}
