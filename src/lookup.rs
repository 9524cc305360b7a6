use crate::domain::OfferRecord;
use crate::error::SourcingError;

/// Resolves one chunk of part numbers to offer records.
///
/// An identifier with no matches contributes no records. A failure of the
/// whole upstream call is reported as an error for the chunk; the caller
/// decides whether that aborts the batch.
pub trait PartLookup: Send + Sync {
    fn lookup(&self, chunk: &[String]) -> Result<Vec<OfferRecord>, SourcingError>;
}

impl<T: PartLookup + ?Sized> PartLookup for Box<T> {
    fn lookup(&self, chunk: &[String]) -> Result<Vec<OfferRecord>, SourcingError> {
        (**self).lookup(chunk)
    }
}
