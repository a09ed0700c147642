/// Character set declared for the subject and every body part
pub const CHARSET: &str = "UTF-8";

/// A fully resolved message for one recipient
///
/// `text` and `html` are independent: a body that is `None` is left out of
/// the transmitted message entirely, which is not the same as an empty part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmissionRequest {
    /// Value of the `From` header, already encoded
    pub source: String,
    pub destination: String,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}
