//! Chemical element symbols

use crate::core::Species;

const SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Atomic number of a chemical symbol (case-sensitive, e.g. `"Si"`)
pub fn atomic_number(symbol: &str) -> Option<Species> {
    SYMBOLS
        .iter()
        .position(|&s| s == symbol)
        .map(|i| i as Species + 1)
}

/// Chemical symbol of an atomic number
pub fn symbol(atomic_number: Species) -> Option<&'static str> {
    let index = usize::try_from(atomic_number).ok()?.checked_sub(1)?;
    SYMBOLS.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("O"), Some(8));
        assert_eq!(atomic_number("Si"), Some(14));
        assert_eq!(atomic_number("Og"), Some(118));
        assert_eq!(atomic_number("si"), None);
        assert_eq!(atomic_number("Xx"), None);
    }

    #[test]
    fn test_symbol() {
        assert_eq!(symbol(6), Some("C"));
        assert_eq!(symbol(0), None);
        assert_eq!(symbol(119), None);
        for z in 1..=118 {
            assert_eq!(symbol(z).and_then(atomic_number), Some(z));
        }
    }
}
