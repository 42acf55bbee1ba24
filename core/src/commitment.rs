//! Commitment detection for promise-fulfillment scoring.
//!
//! A commitment is an actor statement promising a concrete deliverable
//! ("we will provide a decryptor"). It counts as fulfilled when a later
//! message reports that deliverable as done ("here is your decryptor").
//!
//! Matching is case-insensitive substring matching against a versioned
//! phrase lexicon. Bump the version whenever a phrase list changes so
//! published scores stay traceable to the rule set that produced them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentKind {
    Decryptor,
    Deletion,
    TestDecryption,
}

/// Pluggable commitment matching strategy.
pub trait CommitmentMatcher: Send + Sync {
    /// Identifier of the rule set, recorded alongside extracted features.
    fn version(&self) -> &str;

    /// Commitment kinds stated in `text`.
    fn commitments(&self, text: &str) -> Vec<CommitmentKind>;

    /// Commitment kinds reported as fulfilled in `text`.
    fn fulfillments(&self, text: &str) -> Vec<CommitmentKind>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub kind: CommitmentKind,
    pub commitment_phrases: Vec<String>,
    pub fulfillment_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentLexicon {
    pub version: String,
    pub entries: Vec<LexiconEntry>,
}

impl CommitmentLexicon {
    /// Version 1 phrase set.
    pub fn v1() -> Self {
        Self {
            version: "lexicon-v1".into(),
            entries: vec![
                entry(
                    CommitmentKind::Decryptor,
                    &[
                        "will provide the decrypt",
                        "will provide a decrypt",
                        "will send you the decrypt",
                        "will send you the key",
                        "will send the key",
                        "will give you a decryptor",
                        "will give you the decryptor",
                        "you will receive a decryptor",
                        "you will receive the decryptor",
                        "you will receive a universal decryptor",
                        "we will provide an unlocker",
                        "we provide the decryptor",
                    ],
                    &[
                        "here is your decryptor",
                        "here is the decryptor",
                        "here is the decryption tool",
                        "here is the key",
                        "here is your key",
                        "download your decryptor",
                        "download the decryptor",
                        "decryptor is available at",
                        "decryptor has been sent",
                        "decryption key has been sent",
                        "the decryptor works",
                        "decryption was successful",
                    ],
                ),
                entry(
                    CommitmentKind::Deletion,
                    &[
                        "we will delete",
                        "will be deleted",
                        "we will erase",
                        "we will remove your files",
                        "we will remove your data",
                        "guarantee data deletion",
                        "will not keep any backups",
                        "will receive a deletion log",
                        "will provide a deletion log",
                    ],
                    &[
                        "has been deleted",
                        "have been deleted",
                        "was deleted",
                        "were deleted",
                        "we have deleted",
                        "we deleted",
                        "deletion log attached",
                        "here is the deletion log",
                        "has been wiped",
                        "have been wiped",
                        "was wiped",
                        "page was removed",
                        "page has been removed",
                    ],
                ),
                entry(
                    CommitmentKind::TestDecryption,
                    &[
                        "test decryption",
                        "decrypt them for free",
                        "decrypt a few files",
                        "decrypt some files",
                        "decrypt test files",
                        "decrypt sample files",
                        "files for verification",
                        "trial decryptor",
                    ],
                    &[
                        "test files you decrypted",
                        "decrypted files work",
                        "decrypted samples work",
                        "decrypted test files",
                        "decrypted samples opened",
                        "sample you returned is correct",
                        "sample file you sent back works",
                        "files you sent back were properly decrypted",
                        "here are your decrypted files",
                        "here are the decrypted files",
                    ],
                ),
            ],
        }
    }

    fn matching(&self, text: &str, phrases: fn(&LexiconEntry) -> &[String]) -> Vec<CommitmentKind> {
        let haystack = text.to_lowercase();
        self.entries
            .iter()
            .filter(|e| phrases(e).iter().any(|p| haystack.contains(&p.to_lowercase())))
            .map(|e| e.kind)
            .collect()
    }
}

impl Default for CommitmentLexicon {
    fn default() -> Self {
        Self::v1()
    }
}

impl CommitmentMatcher for CommitmentLexicon {
    fn version(&self) -> &str {
        &self.version
    }

    fn commitments(&self, text: &str) -> Vec<CommitmentKind> {
        self.matching(text, |e| e.commitment_phrases.as_slice())
    }

    fn fulfillments(&self, text: &str) -> Vec<CommitmentKind> {
        self.matching(text, |e| e.fulfillment_phrases.as_slice())
    }
}

fn entry(kind: CommitmentKind, commitments: &[&str], fulfillments: &[&str]) -> LexiconEntry {
    LexiconEntry {
        kind,
        commitment_phrases: commitments.iter().map(|s| s.to_string()).collect(),
        fulfillment_phrases: fulfillments.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_commitments_by_kind() {
        let lex = CommitmentLexicon::v1();
        assert_eq!(
            lex.commitments("After payment We Will Send You The Key and a tool."),
            vec![CommitmentKind::Decryptor]
        );
        assert_eq!(
            lex.commitments("All your files will be deleted after payment"),
            vec![CommitmentKind::Deletion]
        );
        assert!(lex.commitments("pay now").is_empty());
    }

    #[test]
    fn victim_accusation_is_not_a_fulfillment() {
        let lex = CommitmentLexicon::v1();
        assert!(lex
            .fulfillments("you said our data would be deleted from your servers")
            .is_empty());
        assert_eq!(
            lex.fulfillments("Your data has been deleted, deletion log attached"),
            vec![CommitmentKind::Deletion]
        );
    }
}
