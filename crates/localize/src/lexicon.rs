use std::collections::HashSet;

/// Case-folded German lexicon gating OCR digraph restoration. Creditor-domain
/// vocabulary plus common Umlaut-carrying words and frequent surnames; a
/// token is only restored when its restored form appears here.
static WORDS: &[&str] = &[
    // Creditor / dunning domain
    "gläubiger",
    "gläubigerin",
    "gläubigervertreter",
    "schuldner",
    "schuldnerin",
    "forderung",
    "forderungen",
    "forderungshöhe",
    "gesamtforderung",
    "hauptforderung",
    "restschuld",
    "rückstand",
    "rückzahlung",
    "mahnung",
    "mahngebühren",
    "gebühren",
    "zinsen",
    "verzugszinsen",
    "säumniszuschlag",
    "fällig",
    "fälligkeit",
    "überweisung",
    "konto",
    "aktenzeichen",
    "geschäftszeichen",
    "vergütung",
    "bevollmächtigte",
    "bevollmächtigter",
    "vollstreckung",
    "zwangsvollstreckung",
    "pfändung",
    "ratenzahlung",
    "tilgung",
    "erhöht",
    "erhöhung",
    "begleichen",
    "überfällig",
    "schuldnerberatung",
    "insolvenzverfahren",
    "glaubhaft",
    // Common words with Umlauts
    "für",
    "über",
    "während",
    "zurück",
    "möglich",
    "möglichkeit",
    "zusätzlich",
    "sämtliche",
    "grüße",
    "grüßen",
    "müssen",
    "können",
    "wünschen",
    "später",
    "nächste",
    "höhe",
    "prüfen",
    "prüfung",
    "erklärung",
    "anhörung",
    "bezüglich",
    "ursprünglich",
    "vorläufig",
    "endgültig",
    "straße",
    "büro",
    // Cities
    "münchen",
    "köln",
    "düsseldorf",
    "nürnberg",
    "würzburg",
    "münster",
    "lübeck",
    "osnabrück",
    "saarbrücken",
    "göttingen",
    "tübingen",
    "fürth",
    // Frequent surnames
    "müller",
    "schäfer",
    "schröder",
    "krüger",
    "köhler",
    "jäger",
    "möller",
    "bäcker",
    "körner",
    "löwe",
    "könig",
    "röder",
    "günther",
    "böhm",
    "lück",
];

lazy_static::lazy_static! {
    static ref LEXICON: HashSet<&'static str> = WORDS.iter().copied().collect();
}

pub fn contains(word: &str) -> bool {
    LEXICON.contains(word.to_lowercase().as_str())
}
