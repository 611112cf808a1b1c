//! Accepted vaccine names and the comma-separated display string built from them.

/// Vaccine names accepted in the `vaccine` column.
pub const VACCINES_ACCEPTED: &[&str] = &[
    "Abdala",
    "CanSino",
    "Covaxin",
    "COVIran Barekat",
    "CoviVac",
    "EpiVacCorona",
    "FAKHRAVAC",
    "IMBCAMS",
    "Johnson&Johnson",
    "KCONVAC",
    "Medigen",
    "Moderna",
    "Novavax",
    "Oxford/AstraZeneca",
    "Pfizer/BioNTech",
    "QazVac",
    "Razi Cov Pars",
    "Sinopharm/Beijing",
    "Sinopharm/Wuhan",
    "Sinovac",
    "Soberana02",
    "Soberana Plus",
    "SpikoGen",
    "Sputnik Light",
    "Sputnik V",
    "Turkovac",
    "ZF2001",
    "ZyCoV-D",
];

pub const VACCINE_SEPARATOR: &str = ", ";

/// Split a display string such as `"Moderna, Pfizer/BioNTech"` into names.
pub fn split_vaccines(display: &str) -> impl Iterator<Item = &str> {
    display
        .split(VACCINE_SEPARATOR)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Names in `display` that are not accepted, sorted and deduplicated.
pub fn unknown_vaccines(display: &str) -> Vec<String> {
    let mut wrong: Vec<String> = split_vaccines(display)
        .filter(|name| !VACCINES_ACCEPTED.contains(name))
        .map(str::to_string)
        .collect();
    wrong.sort();
    wrong.dedup();
    wrong
}

/// Join names into the canonical display string (sorted, deduplicated).
pub fn join_vaccines<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> = names.into_iter().map(str::trim).collect();
    names.sort_unstable();
    names.dedup();
    names.join(VACCINE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_listed_once() {
        assert!(unknown_vaccines("Moderna, Pfizer/BioNTech").is_empty());
        assert_eq!(
            unknown_vaccines("Moderna, Vaxzilla, Vaxzilla"),
            vec!["Vaxzilla".to_string()]
        );
    }

    #[test]
    fn join_sorts_and_dedups() {
        assert_eq!(
            join_vaccines(["Sinovac", "Moderna", "Sinovac"]),
            "Moderna, Sinovac"
        );
    }
}
