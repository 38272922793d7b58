use deunicode::deunicode;
use lazy_regex::regex;

/// Word-prefix query over names: every query word must start some word of the name.
#[derive(Debug, PartialEq, Eq)]
pub struct PrefixQuery {
    words: Vec<String>,
}

impl PrefixQuery {
    pub fn parse(query: &str) -> PrefixQuery {
        PrefixQuery {
            words: words(query),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.is_empty() {
            return false;
        }

        let name_words = words(name);
        self.words
            .iter()
            .all(|query_word| name_words.iter().any(|w| w.starts_with(query_word.as_str())))
    }
}

/// The words of `name` the way queries see them, joined by single spaces.
pub fn search_key(name: &str) -> String {
    words(name).join(" ")
}

fn words(text: &str) -> Vec<String> {
    // Apostrophes are dropped rather than splitting: "Christie's" is one word.
    let normalized = deunicode(text).to_lowercase().replace('\'', "");

    regex!(r"[a-z0-9]+")
        .find_iter(&normalized)
        .map(|m| m.as_str().to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{search_key, PrefixQuery};

    #[test]
    fn matches_word_prefixes() {
        let query = PrefixQuery::parse("auc");
        assert!(query.matches("Juliens Auctions"));
        assert!(!query.matches("Christie's"));
    }

    #[test]
    fn all_query_words_must_match() {
        let query = PrefixQuery::parse("phil auc");
        assert!(query.matches("Phillips Auctions"));
        assert!(!query.matches("Juliens Auctions"));
    }

    #[test]
    fn ignores_case_and_diacritics() {
        assert!(PrefixQuery::parse("DOROTH").matches("Dorotheum"));
        assert!(PrefixQuery::parse("galer").matches("Galérie Kröller"));
        assert!(PrefixQuery::parse("kroll").matches("Galérie Kröller"));
    }

    #[test]
    fn apostrophes_do_not_split_words() {
        assert!(PrefixQuery::parse("christies").matches("Christie's"));
        assert!(!PrefixQuery::parse("s").matches("Christie's"));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let query = PrefixQuery::parse(" -- ");
        assert!(query.is_empty());
        assert!(!query.matches("Juliens Auctions"));
    }

    #[test]
    fn search_key_is_normalized_words() {
        assert_eq!(search_key("Galérie  Kröller-Müller"), "galerie kroller muller");
        assert_eq!(search_key("Christie's"), "christies");
        assert_eq!(PrefixQuery::parse("Jul AUCT").words(), ["jul", "auct"]);
    }
}
