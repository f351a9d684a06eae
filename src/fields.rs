//! Column-role detection and output naming.

use crate::normalize::MISSING_MARKER;

/// Footer field a source column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Name,
    Venue,
    Date,
    Mobile,
    Signature,
}

impl FieldRole {
    /// Claim order when detecting roles. A column claimed by an earlier role is not offered
    /// to later ones, so "Name of Exam Venue" is the venue and never the respondent's name.
    pub const RESOLUTION_ORDER: [FieldRole; 5] = [
        FieldRole::Venue,
        FieldRole::Mobile,
        FieldRole::Signature,
        FieldRole::Date,
        FieldRole::Name,
    ];

    /// Lowercase keywords in priority order.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            FieldRole::Name => &["name :", "candidate name", "name of candidate", "name"],
            FieldRole::Venue => &["name of exam venue", "venue", "center"],
            FieldRole::Date => &["timestamp", "date"],
            FieldRole::Mobile => &["mobile number", "mobile", "phone", "contact"],
            FieldRole::Signature => &["signature of observer", "signature"],
        }
    }
}

/// Column index per footer role, or `None` when no column matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldRoles {
    pub name: Option<usize>,
    pub venue: Option<usize>,
    pub date: Option<usize>,
    pub mobile: Option<usize>,
    pub signature: Option<usize>,
}

impl FieldRoles {
    pub fn detect<S: AsRef<str>>(columns: &[S]) -> Self {
        let lowered: Vec<String> = columns
            .iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .collect();
        let mut roles = FieldRoles::default();
        let mut claimed = vec![false; lowered.len()];
        for role in FieldRole::RESOLUTION_ORDER {
            let found = role.keywords().iter().find_map(|keyword| {
                lowered
                    .iter()
                    .enumerate()
                    .find(|(index, column)| !claimed[*index] && contains_word(column, keyword))
                    .map(|(index, _)| index)
            });
            if let Some(index) = found {
                claimed[index] = true;
                log::trace!("column {:?} feeds {role:?}", columns[index].as_ref());
            }
            *roles.slot(role) = found;
        }
        roles
    }

    pub fn get(&self, role: FieldRole) -> Option<usize> {
        match role {
            FieldRole::Name => self.name,
            FieldRole::Venue => self.venue,
            FieldRole::Date => self.date,
            FieldRole::Mobile => self.mobile,
            FieldRole::Signature => self.signature,
        }
    }

    fn slot(&mut self, role: FieldRole) -> &mut Option<usize> {
        match role {
            FieldRole::Name => &mut self.name,
            FieldRole::Venue => &mut self.venue,
            FieldRole::Date => &mut self.date,
            FieldRole::Mobile => &mut self.mobile,
            FieldRole::Signature => &mut self.signature,
        }
    }

    /// Columns rendered in the footer are left out of the per-record field table.
    pub fn is_footer_column(&self, index: usize) -> bool {
        FieldRole::RESOLUTION_ORDER
            .iter()
            .any(|role| self.get(*role) == Some(index))
    }
}

/// `keyword` occurs in `text` at the start of a word, so "date" matches "Date of exam" and
/// "Dated" but not "Candidate".
fn contains_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(at, _)| {
        text[..at]
            .chars()
            .next_back()
            .is_none_or(|prev| !prev.is_alphanumeric())
    })
}

/// Columns whose values identify a record in its file name.
pub fn naming_columns<S: AsRef<str>>(columns: &[S]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, column)| {
            let lowered = column.as_ref().to_lowercase();
            ["name", "candidate", "id"]
                .iter()
                .any(|keyword| lowered.contains(keyword))
        })
        .map(|(index, _)| index)
        .collect()
}

/// File stem for one record: the first two naming values joined by `_`, or `Record_<n>`
/// (1-based) when none of them carries a value.
pub fn record_stem(values: &[&str], record_number: usize) -> String {
    let parts: Vec<&str> = values
        .iter()
        .take(2)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(MISSING_MARKER))
        .collect();
    let stem = if parts.is_empty() {
        format!("Record_{record_number}")
    } else {
        parts.join("_")
    };
    sanitize_filename(&stem)
}

pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// `"Pre-Exam Report (Responses)"` becomes `"PRE-EXAM REPORT"`.
pub fn clean_title(source_name: &str) -> String {
    let head = source_name.split('(').next().unwrap_or_default();
    head.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_keywords_in_priority_order() {
        let columns = ["Center Code", "Venue", "Name of Exam Venue"];
        let roles = FieldRoles::detect(&columns);
        assert_eq!(roles.venue, Some(2));
    }

    #[test]
    fn roles_do_not_share_a_column() {
        let columns = ["Timestamp", "Name of Exam Venue", "Observer Name", "Mobile Number"];
        let roles = FieldRoles::detect(&columns);
        assert_eq!(roles.venue, Some(1));
        assert_eq!(roles.name, Some(2));
        assert_eq!(roles.date, Some(0));
        assert_eq!(roles.mobile, Some(3));
        assert_eq!(roles.signature, None);
        assert!(roles.is_footer_column(3));
    }

    #[test]
    fn venue_column_never_doubles_as_name() {
        let roles = FieldRoles::detect(&["Name of Exam Venue", "Remarks"]);
        assert_eq!(roles.venue, Some(0));
        assert_eq!(roles.name, None);
        assert!(!roles.is_footer_column(1));
    }

    #[test]
    fn candidate_column_is_not_a_date() {
        let roles = FieldRoles::detect(&["Name of Candidate", "Name of Exam Venue", "Remarks"]);
        assert_eq!(roles.name, Some(0));
        assert_eq!(roles.venue, Some(1));
        assert_eq!(roles.date, None);
        assert!(!roles.is_footer_column(2));

        let roles = FieldRoles::detect(&["Candidate Name", "Date of Exam"]);
        assert_eq!(roles.name, Some(0));
        assert_eq!(roles.date, Some(1));
    }

    #[test]
    fn keywords_match_at_word_starts() {
        assert!(contains_word("dated on", "date"));
        assert!(contains_word("exam (date)", "date"));
        assert!(!contains_word("candidate", "date"));
        assert!(contains_word("candidate date", "date"));
        assert!(!contains_word("username", "name"));
    }

    #[test]
    fn matching_ignores_case_and_padding() {
        let roles = FieldRoles::detect(&["  SIGNATURE of Observer (upload) ", "DATE"]);
        assert_eq!(roles.signature, Some(0));
        assert_eq!(roles.date, Some(1));
    }

    #[test]
    fn naming_prefers_first_two_values() {
        let columns = ["Timestamp", "Candidate Name", "Roll ID", "Observer Name"];
        assert_eq!(naming_columns(&columns), vec![1, 2, 3]);
        assert_eq!(record_stem(&["Asha Devi", "R-12", "x"], 1), "Asha_Devi_R-12");
        assert_eq!(record_stem(&["nan", " "], 4), "Record_4");
        assert_eq!(record_stem(&[], 2), "Record_2");
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_filename(r#"A/B\C*D?E:F"G<H>I|J K"#), "ABCDEFGHIJ_K");
    }

    #[test]
    fn title_from_source_name() {
        assert_eq!(clean_title("Pre-Exam Report (Responses)"), "PRE-EXAM REPORT");
        assert_eq!(clean_title("  daily log "), "DAILY LOG");
    }
}
