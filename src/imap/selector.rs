//! Choosing which mailbox and which messages a retrieval works on.

use std::fmt;
use std::str::FromStr;

use nom::branch::alt;
use nom::character::complete::{char, digit1, space0, space1};
use nom::combinator::{all_consuming, map_res, opt, value};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded};
use nom::IResult;

use super::client::validate_str;
use super::types::{MailboxLabel, Seq};
use crate::error::{Error, ParseError, Result};
use crate::utils::iter_join;

/// One element of an explicit id list: a single message or an inclusive range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdSpec {
    Id(Seq),
    Range(Seq, Seq),
}

impl From<Seq> for IdSpec {
    fn from(id: Seq) -> Self {
        IdSpec::Id(id)
    }
}

impl fmt::Display for IdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IdSpec::Id(id) => write!(f, "{}", id),
            IdSpec::Range(a, b) => write!(f, "{}-{}", a, b),
        }
    }
}

/// Reject zero ids and descending ranges without expanding anything.
pub fn check_ids(specs: &[IdSpec]) -> Result<()> {
    for spec in specs {
        match *spec {
            IdSpec::Id(0) | IdSpec::Range(0, _) => {
                return Err(Error::InvalidSelector("message ids start at 1".into()))
            }
            IdSpec::Range(a, b) if a > b => {
                return Err(Error::InvalidSelector(format!("descending range {}", spec)))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Expand ids and ranges, in order, into concrete message ids. `a-b` yields `a..=b`.
///
/// This allocates one entry per id; retrievals walk the specs lazily instead.
pub fn expand_ids(specs: &[IdSpec]) -> Result<Vec<Seq>> {
    check_ids(specs)?;
    let mut ids = Vec::new();
    for spec in specs {
        match *spec {
            IdSpec::Id(id) => ids.push(id),
            IdSpec::Range(a, b) => ids.extend(a..=b),
        }
    }
    Ok(ids)
}

impl IdSpec {
    /// How many ids this spec covers.
    pub fn width(&self) -> u64 {
        match *self {
            IdSpec::Id(_) => 1,
            IdSpec::Range(a, b) => u64::from(b.saturating_sub(a)) + 1,
        }
    }

    /// Take the first id, leaving the rest of a range behind.
    pub(crate) fn split_first(self) -> (Seq, Option<IdSpec>) {
        match self {
            IdSpec::Id(id) => (id, None),
            IdSpec::Range(a, b) if a < b => (a, Some(IdSpec::Range(a + 1, b))),
            IdSpec::Range(a, _) => (a, None),
        }
    }
}

fn number(input: &str) -> IResult<&str, Seq> {
    map_res(digit1, Seq::from_str)(input)
}

fn id_spec(input: &str) -> IResult<&str, IdSpec> {
    let (input, start) = number(input)?;
    let (input, end) = opt(preceded(delimited(space0, char('-'), space0), number))(input)?;
    Ok((
        input,
        match end {
            Some(end) => IdSpec::Range(start, end),
            None => IdSpec::Id(start),
        },
    ))
}

fn id_specs(input: &str) -> IResult<&str, Vec<IdSpec>> {
    let separator = alt((value((), delimited(space0, char(','), space0)), value((), space1)));
    all_consuming(delimited(space0, separated_list1(separator, id_spec), space0))(input)
}

/// Parse a range string such as `"1-3,5"` into id specs.
///
/// Digits accumulate into one id; a `-` makes the next digit run the inclusive upper bound.
/// Elements are separated by commas or whitespace. Empty input, a dangling `-`, a zero id and a
/// descending range are all errors.
pub fn parse_id_ranges(input: &str) -> Result<Vec<IdSpec>> {
    let specs = match id_specs(input) {
        Ok((_, specs)) => specs,
        Err(_) => return Err(Error::Parse(ParseError::IdRange(input.to_string()))),
    };
    check_ids(&specs)?;
    Ok(specs)
}

/// Parse a range string and expand it into concrete message ids.
pub fn expand_id_ranges(input: &str) -> Result<Vec<Seq>> {
    expand_ids(&parse_id_ranges(input)?)
}

/// The search keys a [`SearchQuery`] may use. They are sent to the server as written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchSection {
    Bcc,
    Before,
    Body,
    Cc,
    From,
    Header,
    Keyword,
    Larger,
    Not,
    On,
    SentBefore,
    SentOn,
    SentSince,
    Since,
    Smaller,
    Subject,
    Text,
    To,
    Uid,
}

impl SearchSection {
    pub const ALL: [SearchSection; 19] = [
        SearchSection::Bcc,
        SearchSection::Before,
        SearchSection::Body,
        SearchSection::Cc,
        SearchSection::From,
        SearchSection::Header,
        SearchSection::Keyword,
        SearchSection::Larger,
        SearchSection::Not,
        SearchSection::On,
        SearchSection::SentBefore,
        SearchSection::SentOn,
        SearchSection::SentSince,
        SearchSection::Since,
        SearchSection::Smaller,
        SearchSection::Subject,
        SearchSection::Text,
        SearchSection::To,
        SearchSection::Uid,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            SearchSection::Bcc => "BCC",
            SearchSection::Before => "BEFORE",
            SearchSection::Body => "BODY",
            SearchSection::Cc => "CC",
            SearchSection::From => "FROM",
            SearchSection::Header => "HEADER",
            SearchSection::Keyword => "KEYWORD",
            SearchSection::Larger => "LARGER",
            SearchSection::Not => "NOT",
            SearchSection::On => "ON",
            SearchSection::SentBefore => "SENTBEFORE",
            SearchSection::SentOn => "SENTON",
            SearchSection::SentSince => "SENTSINCE",
            SearchSection::Since => "SINCE",
            SearchSection::Smaller => "SMALLER",
            SearchSection::Subject => "SUBJECT",
            SearchSection::Text => "TEXT",
            SearchSection::To => "TO",
            SearchSection::Uid => "UID",
        }
    }
}

impl fmt::Display for SearchSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for SearchSection {
    type Err = Error;

    /// Keywords are case-sensitive.
    fn from_str(s: &str) -> Result<Self> {
        SearchSection::ALL
            .iter()
            .copied()
            .find(|section| section.keyword() == s)
            .ok_or_else(|| Error::InvalidSelector(format!("unsupported search section {:?}", s)))
    }
}

/// A server-side search on one section. The text is quoted but otherwise passed through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub section: SearchSection,
    pub text: String,
}

impl SearchQuery {
    pub fn new(section: SearchSection, text: impl Into<String>) -> Self {
        SearchQuery {
            section,
            text: text.into(),
        }
    }

    /// The arguments of the `SEARCH` command.
    pub fn to_command(&self) -> Result<String> {
        Ok(format!("{} {}", self.section, validate_str(&self.text)?))
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.section, self.text)
    }
}

/// Picks a subset of the ids in the selected mailbox.
pub type IdResolver = Box<dyn FnOnce(&[Seq]) -> Vec<Seq> + Send>;

/// Picks a mailbox name out of a listing. `None` declines the choice.
pub type MailboxResolver = Box<dyn FnOnce(&[MailboxLabel]) -> Option<String> + Send>;

/// Which messages in the selected mailbox a retrieval yields.
pub enum MessageIdSelector {
    /// Every message, as found by `SEARCH ALL`.
    AllMessages,
    /// These ids, in this order.
    ExplicitIds(Vec<IdSpec>),
    /// Whatever a server-side search matches. Matching nothing is [`Error::NotFound`].
    SearchQuery(SearchQuery),
    /// Whatever the resolver picks from the full id listing.
    ExternalSelection(IdResolver),
}

impl fmt::Debug for MessageIdSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageIdSelector::AllMessages => f.write_str("AllMessages"),
            MessageIdSelector::ExplicitIds(ids) => {
                write!(f, "ExplicitIds({})", iter_join(ids, ","))
            }
            MessageIdSelector::SearchQuery(q) => f.debug_tuple("SearchQuery").field(q).finish(),
            MessageIdSelector::ExternalSelection(_) => f.write_str("ExternalSelection(..)"),
        }
    }
}

/// Everything one call to [`ImapRetriever::retrieve`] needs to know.
///
/// At most one of [`ids`](Self::ids), [`id_ranges`](Self::id_ranges),
/// [`search`](Self::search), [`select_ids_with`](Self::select_ids_with) and
/// [`selector`](Self::selector) may be used; with none of them every message is retrieved.
///
/// [`ImapRetriever::retrieve`]: super::ImapRetriever::retrieve
#[derive(Default)]
pub struct RetrieveRequest {
    mailbox: String,
    delete: bool,
    ids: Vec<IdSpec>,
    ranges: Option<String>,
    search: Option<SearchQuery>,
    id_resolver: Option<IdResolver>,
    selector: Option<MessageIdSelector>,
    mailbox_resolver: Option<MailboxResolver>,
}

pub(crate) struct Validated {
    pub(crate) mailbox: String,
    pub(crate) delete: bool,
    pub(crate) selector: MessageIdSelector,
    pub(crate) mailbox_resolver: Option<MailboxResolver>,
}

impl RetrieveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve from `name`. When left empty the mailbox is resolved from a listing.
    pub fn mailbox(mut self, name: impl Into<String>) -> Self {
        self.mailbox = name.into();
        self
    }

    /// Flag every yielded message `\Deleted` and expunge once the retrieval ends.
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<IdSpec>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Ids given as a range string, see [`parse_id_ranges`].
    pub fn id_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.ranges = Some(ranges.into());
        self
    }

    pub fn search(mut self, section: SearchSection, text: impl Into<String>) -> Self {
        self.search = Some(SearchQuery::new(section, text));
        self
    }

    /// Let `resolver` choose from the ids in the selected mailbox.
    pub fn select_ids_with<F>(mut self, resolver: F) -> Self
    where
        F: FnOnce(&[Seq]) -> Vec<Seq> + Send + 'static,
    {
        self.id_resolver = Some(Box::new(resolver));
        self
    }

    /// Use a ready-made selector.
    pub fn selector(mut self, selector: MessageIdSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Let `resolver` choose the mailbox when none is named.
    pub fn select_mailbox_with<F>(mut self, resolver: F) -> Self
    where
        F: FnOnce(&[MailboxLabel]) -> Option<String> + Send + 'static,
    {
        self.mailbox_resolver = Some(Box::new(resolver));
        self
    }

    pub(crate) fn validate(self) -> Result<Validated> {
        let populated: Vec<&str> = [
            ("ids", !self.ids.is_empty()),
            ("id_ranges", self.ranges.is_some()),
            ("search", self.search.is_some()),
            ("select_ids_with", self.id_resolver.is_some()),
            ("selector", self.selector.is_some()),
        ]
        .iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect();
        if populated.len() > 1 {
            return Err(Error::InvalidSelector(format!(
                "only one selector may be given, got {}",
                iter_join(populated, ", ")
            )));
        }

        let selector = if !self.ids.is_empty() {
            check_ids(&self.ids)?;
            MessageIdSelector::ExplicitIds(self.ids)
        } else if let Some(ranges) = self.ranges {
            MessageIdSelector::ExplicitIds(parse_id_ranges(&ranges)?)
        } else if let Some(query) = self.search {
            MessageIdSelector::SearchQuery(query)
        } else if let Some(resolver) = self.id_resolver {
            MessageIdSelector::ExternalSelection(resolver)
        } else if let Some(selector) = self.selector {
            if let MessageIdSelector::ExplicitIds(ref ids) = selector {
                check_ids(ids)?;
            }
            selector
        } else {
            MessageIdSelector::AllMessages
        };

        Ok(Validated {
            mailbox: self.mailbox,
            delete: self.delete,
            selector,
            mailbox_resolver: self.mailbox_resolver,
        })
    }
}

impl fmt::Debug for RetrieveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrieveRequest")
            .field("mailbox", &self.mailbox)
            .field("delete", &self.delete)
            .field("ids", &self.ids)
            .field("ranges", &self.ranges)
            .field("search", &self.search)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_and_ids() {
        assert_eq!(expand_id_ranges("1-3,5").unwrap(), vec![1, 2, 3, 5]);
        assert_eq!(expand_id_ranges("7").unwrap(), vec![7]);
    }

    #[test]
    fn multi_digit_ids() {
        assert_eq!(
            parse_id_ranges("10-12, 100").unwrap(),
            vec![IdSpec::Range(10, 12), IdSpec::Id(100)]
        );
        assert_eq!(expand_id_ranges("10-12 100").unwrap(), vec![10, 11, 12, 100]);
        assert_eq!(expand_id_ranges(" 4 - 5 ").unwrap(), vec![4, 5]);
    }

    #[test]
    fn trailing_dash_is_an_error() {
        assert!(matches!(
            parse_id_ranges("1-"),
            Err(Error::Parse(ParseError::IdRange(ref s))) if s == "1-"
        ));
        assert!(parse_id_ranges("1-3,").is_err());
        assert!(parse_id_ranges("").is_err());
        assert!(parse_id_ranges("a").is_err());
    }

    #[test]
    fn descending_and_zero_rejected() {
        assert!(matches!(parse_id_ranges("5-3"), Err(Error::InvalidSelector(_))));
        assert!(matches!(parse_id_ranges("0"), Err(Error::InvalidSelector(_))));
    }

    #[test]
    fn search_sections_round_trip_keywords() {
        for section in SearchSection::ALL {
            assert_eq!(section.keyword().parse::<SearchSection>().unwrap(), section);
        }
        assert!("from".parse::<SearchSection>().is_err());
        assert!("ALL".parse::<SearchSection>().is_err());
    }

    #[test]
    fn search_query_is_quoted() {
        let q = SearchQuery::new(SearchSection::Subject, "say \"hi\"");
        assert_eq!(q.to_command().unwrap(), "SUBJECT \"say \\\"hi\\\"\"");
        let q = SearchQuery::new(SearchSection::From, "a\r\nb");
        assert!(matches!(q.to_command(), Err(Error::Validate(_))));
    }

    #[test]
    fn empty_request_means_all_messages() {
        let v = RetrieveRequest::new().validate().unwrap();
        assert!(matches!(v.selector, MessageIdSelector::AllMessages));
        assert!(!v.delete);
        assert!(v.mailbox.is_empty());
    }

    #[test]
    fn conflicting_selectors_rejected() {
        let err = RetrieveRequest::new()
            .ids([1u32, 2])
            .search(SearchSection::From, "bob")
            .validate()
            .err()
            .unwrap();
        match err {
            Error::InvalidSelector(why) => assert!(why.contains("ids, search")),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(RetrieveRequest::new()
            .id_ranges("1-2")
            .select_ids_with(|ids| ids.to_vec())
            .validate()
            .is_err());
    }

    #[test]
    fn ranges_parsed_at_validation() {
        let v = RetrieveRequest::new().id_ranges("2-4").validate().unwrap();
        match v.selector {
            MessageIdSelector::ExplicitIds(ids) => assert_eq!(ids, vec![IdSpec::Range(2, 4)]),
            other => panic!("unexpected selector: {:?}", other),
        }
        assert!(RetrieveRequest::new().id_ranges("2-").validate().is_err());
    }

    #[test]
    fn wide_range_validates_without_expanding() {
        let v = RetrieveRequest::new()
            .id_ranges("1-4000000000")
            .validate()
            .unwrap();
        match v.selector {
            MessageIdSelector::ExplicitIds(ids) => {
                assert_eq!(ids, vec![IdSpec::Range(1, 4_000_000_000)]);
                assert_eq!(ids[0].width(), 4_000_000_000);
            }
            other => panic!("unexpected selector: {:?}", other),
        }
        assert!(check_ids(&[IdSpec::Range(1, Seq::MAX)]).is_ok());
        assert!(check_ids(&[IdSpec::Id(3), IdSpec::Range(9, 2)]).is_err());
    }

    #[test]
    fn split_first_walks_a_range() {
        assert_eq!(IdSpec::Range(4, 6).split_first(), (4, Some(IdSpec::Range(5, 6))));
        assert_eq!(IdSpec::Range(6, 6).split_first(), (6, None));
        assert_eq!(IdSpec::Id(2).split_first(), (2, None));
        assert_eq!(IdSpec::Range(1, Seq::MAX).width(), u64::from(Seq::MAX));
    }

    #[test]
    fn explicit_selector_passes_through() {
        let v = RetrieveRequest::new()
            .selector(MessageIdSelector::SearchQuery(SearchQuery::new(
                SearchSection::Since,
                "1-Jan-2020",
            )))
            .mailbox("INBOX")
            .delete(true)
            .validate()
            .unwrap();
        assert!(matches!(v.selector, MessageIdSelector::SearchQuery(_)));
        assert_eq!(v.mailbox, "INBOX");
        assert!(v.delete);
    }
}
