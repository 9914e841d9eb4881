/// A chemical element with its standard atomic weight in g/mol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub symbol: &'static str,
    pub name: &'static str,
    pub molar_mass: f64,
}

const fn el(symbol: &'static str, name: &'static str, molar_mass: f64) -> Element {
    Element {
        symbol,
        name,
        molar_mass,
    }
}

pub const PERIODIC_TABLE: &[Element] = &[
    el("H", "hydrogen", 1.00794),
    el("He", "helium", 4.002602),
    el("Li", "lithium", 6.941),
    el("Be", "beryllium", 9.012182),
    el("B", "boron", 10.811),
    el("C", "carbon", 12.0107),
    el("N", "nitrogen", 14.0067),
    el("O", "oxygen", 15.9994),
    el("F", "fluorine", 18.9984032),
    el("Ne", "neon", 20.1797),
    el("Na", "sodium", 22.98976928),
    el("Mg", "magnesium", 24.305),
    el("Al", "aluminium", 26.9815386),
    el("Si", "silicon", 28.0855),
    el("P", "phosphorus", 30.973762),
    el("S", "sulfur", 32.065),
    el("Cl", "chlorine", 35.453),
    el("Ar", "argon", 39.948),
    el("K", "potassium", 39.0983),
    el("Ca", "calcium", 40.078),
    el("Sc", "scandium", 44.955912),
    el("Ti", "titanium", 47.867),
    el("V", "vanadium", 50.9415),
    el("Cr", "chromium", 51.9961),
    el("Mn", "manganese", 54.938045),
    el("Fe", "iron", 55.845),
    el("Co", "cobalt", 58.933195),
    el("Ni", "nickel", 58.6934),
    el("Cu", "copper", 63.546),
    el("Zn", "zinc", 65.38),
    el("Ga", "gallium", 69.723),
    el("Ge", "germanium", 72.64),
    el("As", "arsenic", 74.9216),
    el("Se", "selenium", 78.96),
    el("Br", "bromine", 79.904),
    el("Kr", "krypton", 83.798),
    el("Rb", "rubidium", 85.4678),
    el("Sr", "strontium", 87.62),
    el("Y", "yttrium", 88.90585),
    el("Zr", "zirconium", 91.224),
    el("Nb", "niobium", 92.90638),
    el("Mo", "molybdenum", 95.96),
    el("Tc", "technetium", 98.0),
    el("Ru", "ruthenium", 101.07),
    el("Rh", "rhodium", 102.9055),
    el("Pd", "palladium", 106.42),
    el("Ag", "silver", 107.8682),
    el("Cd", "cadmium", 112.411),
    el("In", "indium", 114.818),
    el("Sn", "tin", 118.71),
    el("Sb", "antimony", 121.76),
    el("Te", "tellurium", 127.6),
    el("I", "iodine", 126.90447),
    el("Xe", "xenon", 131.293),
    el("Cs", "caesium", 132.9054519),
    el("Ba", "barium", 137.327),
    el("La", "lanthanum", 138.90547),
    el("Ce", "cerium", 140.116),
    el("Pr", "praseodymium", 140.90765),
    el("Nd", "neodymium", 144.242),
    el("Pm", "promethium", 145.0),
    el("Sm", "samarium", 150.36),
    el("Eu", "europium", 151.964),
    el("Gd", "gadolinium", 157.25),
    el("Tb", "terbium", 158.92535),
    el("Dy", "dysprosium", 162.5),
    el("Ho", "holmium", 164.93032),
    el("Er", "erbium", 167.259),
    el("Tm", "thulium", 168.93421),
    el("Yb", "ytterbium", 173.054),
    el("Lu", "lutetium", 174.9668),
    el("Hf", "hafnium", 178.49),
    el("Ta", "tantalum", 180.94788),
    el("W", "tungsten", 183.84),
    el("Re", "rhenium", 186.207),
    el("Os", "osmium", 190.23),
    el("Ir", "iridium", 192.217),
    el("Pt", "platinum", 195.084),
    el("Au", "gold", 196.966569),
    el("Hg", "mercury", 200.59),
    el("Tl", "thallium", 204.3833),
    el("Pb", "lead", 207.2),
    el("Bi", "bismuth", 208.9804),
    el("Po", "polonium", 209.0),
    el("At", "astatine", 210.0),
    el("Rn", "radon", 222.0),
    el("Fr", "francium", 223.0),
    el("Ra", "radium", 226.0),
    el("Ac", "actinium", 227.0),
    el("Th", "thorium", 232.03806),
    el("Pa", "protactinium", 231.03588),
    el("U", "uranium", 238.02891),
    el("Np", "neptunium", 237.0),
    el("Pu", "plutonium", 244.0),
    el("Am", "americium", 243.0),
    el("Cm", "curium", 247.0),
    el("Bk", "berkelium", 247.0),
    el("Cf", "californium", 251.0),
    el("Es", "einsteinium", 252.0),
    el("Fm", "fermium", 257.0),
    el("Md", "mendelevium", 258.0),
    el("No", "nobelium", 259.0),
    el("Lr", "lawrencium", 262.0),
    el("Rf", "rutherfordium", 267.0),
    el("Db", "dubnium", 268.0),
    el("Sg", "seaborgium", 271.0),
    el("Bh", "bohrium", 272.0),
    el("Hs", "hassium", 270.0),
    el("Mt", "meitnerium", 276.0),
    el("Ds", "darmstadtium", 281.0),
    el("Rg", "roentgenium", 280.0),
    el("Cn", "copernicium", 285.0),
    el("Nh", "nihonium", 284.0),
    el("Fl", "flerovium", 289.0),
    el("Mc", "moscovium", 288.0),
    el("Lv", "livermorium", 293.0),
    el("Ts", "tennessine", 294.0),
    el("Og", "oganesson", 294.0),
];

/// Case-sensitive symbol lookup.
pub fn element(symbol: &str) -> Option<&'static Element> {
    PERIODIC_TABLE.iter().find(|element| element.symbol == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_complete() {
        assert_eq!(PERIODIC_TABLE.len(), 118);
        assert_eq!(element("C").map(|e| e.name), Some("carbon"));
        assert!(element("c").is_none());
        assert!(element("Xx").is_none());
    }
}
