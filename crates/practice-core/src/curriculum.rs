//! Built-in curriculum: courses, units, and the keyword tables the topic
//! classifier scores against.
//!
//! All data here is static and read-only.

use serde::Serialize;

/// A subdivision of a course syllabus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Unit {
    /// Identifier, unique within its course.
    pub id: &'static str,
    /// Display title.
    pub title: &'static str,
    /// Lowercase keywords that indicate this unit.
    #[serde(skip)]
    pub keywords: &'static [&'static str],
}

/// A curriculum subject area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Identifier, unique within the curriculum.
    pub id: &'static str,
    /// Display title.
    pub title: &'static str,
    /// Lowercase keywords naming the course itself.
    #[serde(skip)]
    pub keywords: &'static [&'static str],
    /// Units in syllabus order.
    pub units: &'static [Unit],
    /// Unit used when no unit keyword matched.
    pub default_unit: &'static str,
}

impl Course {
    /// Looks up a unit by id or title, case-insensitively.
    #[must_use]
    pub fn unit(&self, key: &str) -> Option<&'static Unit> {
        let key = key.trim();
        self.units
            .iter()
            .find(|u| u.id.eq_ignore_ascii_case(key) || u.title.eq_ignore_ascii_case(key))
    }
}

/// Terms shared by two courses.
///
/// A match goes to whichever of the two already has evidence; with no
/// evidence, or evidence for both, it goes to `default_course`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossCuttingGroup {
    /// Lowercase ambiguous terms.
    pub keywords: &'static [&'static str],
    /// The two course ids the terms are shared by.
    pub courses: [&'static str; 2],
    /// Course that receives the match when evidence does not decide.
    pub default_course: &'static str,
}

/// A set of courses plus the tables used to classify topics against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Curriculum {
    /// Courses in tie-break order.
    pub courses: &'static [Course],
    /// Ambiguous term groups.
    pub cross_cutting: &'static [CrossCuttingGroup],
    /// Course returned when nothing matches.
    pub default_course: &'static str,
}

/// A caller's explicit course and unit choice, resolved against a curriculum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The selected course.
    pub course: &'static Course,
    /// The selected units, in syllabus order.
    pub units: Vec<&'static Unit>,
}

impl Selection {
    /// Unit ids of the selection.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.id.to_string()).collect()
    }
}

/// Why a course/unit selection could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// The course id or title is not in the curriculum.
    #[error("unknown course '{0}'")]
    UnknownCourse(String),
    /// A unit id or title is not part of the course.
    #[error("unknown unit '{unit}' for course '{course}'")]
    UnknownUnit {
        /// Course the unit was looked up in.
        course: String,
        /// The unrecognized unit.
        unit: String,
    },
}

impl Curriculum {
    /// The built-in curriculum.
    #[must_use]
    pub const fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Looks up a course by id or title, case-insensitively.
    #[must_use]
    pub fn course(&self, key: &str) -> Option<&'static Course> {
        let key = key.trim();
        self.courses
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(key) || c.title.eq_ignore_ascii_case(key))
    }

    /// Index of a course id within [`Curriculum::courses`].
    #[must_use]
    pub fn position(&self, course_id: &str) -> Option<usize> {
        self.courses.iter().position(|c| c.id == course_id)
    }

    /// Resolves an explicit course and unit selection.
    ///
    /// An empty unit list selects every unit of the course.
    pub fn resolve<S: AsRef<str>>(
        &self,
        course: &str,
        units: &[S],
    ) -> Result<Selection, SelectionError> {
        let course = self
            .course(course)
            .ok_or_else(|| SelectionError::UnknownCourse(course.to_string()))?;

        if units.is_empty() {
            return Ok(Selection {
                course,
                units: course.units.iter().collect(),
            });
        }

        let mut selected = Vec::with_capacity(units.len());
        for key in units {
            let unit = course
                .unit(key.as_ref())
                .ok_or_else(|| SelectionError::UnknownUnit {
                    course: course.id.to_string(),
                    unit: key.as_ref().to_string(),
                })?;
            if !selected.contains(&unit) {
                selected.push(unit);
            }
        }
        selected.sort_by_key(|u| course.units.iter().position(|cu| cu.id == u.id));

        Ok(Selection {
            course,
            units: selected,
        })
    }
}

// ============================================================================
// Built-in tables
// ============================================================================

const fn unit(
    id: &'static str,
    title: &'static str,
    keywords: &'static [&'static str],
) -> Unit {
    Unit {
        id,
        title,
        keywords,
    }
}

static BUILTIN: Curriculum = Curriculum {
    courses: COURSES,
    cross_cutting: CROSS_CUTTING,
    default_course: "ap-calculus-ab",
};

const CROSS_CUTTING: &[CrossCuttingGroup] = &[
    CrossCuttingGroup {
        keywords: &["calculus", "math"],
        courses: ["ap-calculus-ab", "ap-calculus-bc"],
        default_course: "ap-calculus-ab",
    },
    CrossCuttingGroup {
        keywords: &["history", "historical"],
        courses: ["ap-us-history", "ap-world-history"],
        default_course: "ap-us-history",
    },
    CrossCuttingGroup {
        keywords: &["econ"],
        courses: ["ap-macroeconomics", "ap-microeconomics"],
        default_course: "ap-macroeconomics",
    },
];

const COURSES: &[Course] = &[
    Course {
        id: "ap-calculus-ab",
        title: "AP Calculus AB",
        keywords: &["calculus ab", "calc ab"],
        units: &[
            unit(
                "unit-1",
                "Limits and Continuity",
                &["limit", "continuity", "asymptote", "squeeze theorem"],
            ),
            unit(
                "unit-2",
                "Differentiation: Definition and Fundamental Properties",
                &["derivative", "differentiat", "power rule", "tangent line"],
            ),
            unit(
                "unit-3",
                "Differentiation: Composite, Implicit, and Inverse Functions",
                &["chain rule", "implicit", "inverse function"],
            ),
            unit(
                "unit-4",
                "Contextual Applications of Differentiation",
                &["related rate", "linearization", "l'hopital", "l'hospital"],
            ),
            unit(
                "unit-5",
                "Analytical Applications of Differentiation",
                &["mean value theorem", "extrema", "optimization", "concavity"],
            ),
            unit(
                "unit-6",
                "Integration and Accumulation of Change",
                &["integral", "riemann sum", "antiderivative", "fundamental theorem"],
            ),
            unit(
                "unit-7",
                "Differential Equations",
                &["differential equation", "slope field", "separation of variables"],
            ),
            unit(
                "unit-8",
                "Applications of Integration",
                &["area between curves", "volume of", "disc method", "washer method"],
            ),
        ],
        default_unit: "unit-1",
    },
    Course {
        id: "ap-calculus-bc",
        title: "AP Calculus BC",
        keywords: &["calculus bc", "calc bc"],
        units: &[
            unit(
                "unit-6",
                "Integration and Accumulation of Change",
                &["integration by parts", "partial fraction", "improper integral"],
            ),
            unit(
                "unit-7",
                "Differential Equations",
                &["logistic", "euler's method"],
            ),
            unit(
                "unit-9",
                "Parametric Equations, Polar Coordinates, and Vector-Valued Functions",
                &["parametric", "polar", "vector-valued"],
            ),
            unit(
                "unit-10",
                "Infinite Sequences and Series",
                &["series", "taylor", "maclaurin", "ratio test", "convergence"],
            ),
        ],
        default_unit: "unit-10",
    },
    Course {
        id: "ap-statistics",
        title: "AP Statistics",
        keywords: &["statistics", "stats"],
        units: &[
            unit(
                "unit-1",
                "Exploring One-Variable Data",
                &["histogram", "box plot", "standard deviation", "median"],
            ),
            unit(
                "unit-2",
                "Exploring Two-Variable Data",
                &["scatterplot", "correlation", "regression", "residual"],
            ),
            unit(
                "unit-3",
                "Collecting Data",
                &["sampling", "survey", "experiment design", "bias"],
            ),
            unit(
                "unit-4",
                "Probability, Random Variables, and Probability Distributions",
                &["probability", "random variable", "binomial", "geometric distribution"],
            ),
            unit(
                "unit-6",
                "Inference for Categorical Data: Proportions",
                &["confidence interval", "proportion", "margin of error"],
            ),
            unit(
                "unit-7",
                "Inference for Quantitative Data: Means",
                &["t-test", "hypothesis test", "p-value"],
            ),
            unit("unit-8", "Inference for Categorical Data: Chi-Square", &["chi-square"]),
        ],
        default_unit: "unit-1",
    },
    Course {
        id: "ap-us-history",
        title: "AP United States History",
        keywords: &["apush", "us history", "u.s. history", "american history"],
        units: &[
            unit(
                "unit-2",
                "Period 2: 1607-1754",
                &["colonial", "colonies", "jamestown", "puritan"],
            ),
            unit(
                "unit-3",
                "Period 3: 1754-1800",
                &["american revolution", "declaration of independence", "constitution"],
            ),
            unit(
                "unit-5",
                "Period 5: 1844-1877",
                &["civil war", "reconstruction", "manifest destiny"],
            ),
            unit(
                "unit-7",
                "Period 7: 1890-1945",
                &["progressive era", "new deal", "great depression"],
            ),
            unit(
                "unit-8",
                "Period 8: 1945-1980",
                &["civil rights", "vietnam", "cold war america"],
            ),
        ],
        default_unit: "unit-3",
    },
    Course {
        id: "ap-world-history",
        title: "AP World History: Modern",
        keywords: &["world history", "global history"],
        units: &[
            unit(
                "unit-1",
                "The Global Tapestry",
                &["song dynasty", "mali empire", "abbasid"],
            ),
            unit(
                "unit-2",
                "Networks of Exchange",
                &["silk road", "indian ocean trade", "mongol"],
            ),
            unit(
                "unit-4",
                "Transoceanic Interconnections",
                &["columbian exchange", "age of exploration", "atlantic slave trade"],
            ),
            unit(
                "unit-5",
                "Revolutions",
                &["enlightenment", "french revolution", "industrial revolution"],
            ),
            unit(
                "unit-7",
                "Global Conflict",
                &["world war", "imperialism", "totalitarian"],
            ),
        ],
        default_unit: "unit-5",
    },
    Course {
        id: "ap-biology",
        title: "AP Biology",
        keywords: &["biology"],
        units: &[
            unit(
                "unit-1",
                "Chemistry of Life",
                &["macromolecule", "protein", "carbohydrate", "lipid"],
            ),
            unit(
                "unit-2",
                "Cell Structure and Function",
                &["organelle", "cell membrane", "mitochondria", "osmosis"],
            ),
            unit(
                "unit-3",
                "Cellular Energetics",
                &["photosynthesis", "cellular respiration", "enzyme", "atp"],
            ),
            unit(
                "unit-5",
                "Heredity",
                &["meiosis", "mendel", "punnett", "allele"],
            ),
            unit(
                "unit-6",
                "Gene Expression and Regulation",
                &["dna", "mrna", "transcription", "translation", "mutation"],
            ),
            unit(
                "unit-7",
                "Natural Selection",
                &["evolution", "natural selection", "hardy-weinberg", "speciation"],
            ),
            unit("unit-8", "Ecology", &["ecosystem", "food web", "population growth"]),
        ],
        default_unit: "unit-2",
    },
    Course {
        id: "ap-chemistry",
        title: "AP Chemistry",
        keywords: &["chemistry"],
        units: &[
            unit(
                "unit-1",
                "Atomic Structure and Properties",
                &["atomic structure", "electron configuration", "molar mass", "isotope"],
            ),
            unit(
                "unit-2",
                "Compound Structure and Properties",
                &["lewis structure", "vsepr", "covalent", "ionic bond"],
            ),
            unit(
                "unit-4",
                "Chemical Reactions",
                &["stoichiometry", "balancing equation", "redox", "precipitation"],
            ),
            unit(
                "unit-5",
                "Kinetics",
                &["reaction rate", "rate law", "activation energy", "catalyst"],
            ),
            unit(
                "unit-7",
                "Equilibrium",
                &["equilibrium", "le chatelier", "equilibrium constant"],
            ),
            unit(
                "unit-8",
                "Acids and Bases",
                &["acid", "ph scale", "buffer", "titration"],
            ),
        ],
        default_unit: "unit-1",
    },
    Course {
        id: "ap-physics-1",
        title: "AP Physics 1",
        keywords: &["physics"],
        units: &[
            unit(
                "unit-1",
                "Kinematics",
                &["kinematics", "velocity", "acceleration", "projectile"],
            ),
            unit(
                "unit-2",
                "Dynamics",
                &["newton's law", "free body", "friction", "force"],
            ),
            unit(
                "unit-3",
                "Circular Motion and Gravitation",
                &["circular motion", "centripetal", "gravitation"],
            ),
            unit(
                "unit-4",
                "Energy",
                &["kinetic energy", "potential energy", "work-energy", "conservation of energy"],
            ),
            unit(
                "unit-5",
                "Momentum",
                &["momentum", "impulse", "collision"],
            ),
            unit(
                "unit-6",
                "Simple Harmonic Motion",
                &["harmonic", "pendulum", "spring"],
            ),
        ],
        default_unit: "unit-1",
    },
    Course {
        id: "ap-macroeconomics",
        title: "AP Macroeconomics",
        keywords: &["macroeconomics"],
        units: &[
            unit(
                "unit-2",
                "Economic Indicators and the Business Cycle",
                &["gdp", "unemployment", "inflation", "business cycle"],
            ),
            unit(
                "unit-3",
                "National Income and Price Determination",
                &["aggregate demand", "aggregate supply", "multiplier", "fiscal policy"],
            ),
            unit(
                "unit-4",
                "Financial Sector",
                &["money supply", "monetary policy", "federal reserve", "interest rate"],
            ),
            unit(
                "unit-6",
                "Open Economy",
                &["exchange rate", "balance of payments", "trade deficit"],
            ),
        ],
        default_unit: "unit-2",
    },
    Course {
        id: "ap-microeconomics",
        title: "AP Microeconomics",
        keywords: &["microeconomics"],
        units: &[
            unit(
                "unit-2",
                "Supply and Demand",
                &["supply and demand", "elasticity", "consumer surplus", "price ceiling"],
            ),
            unit(
                "unit-3",
                "Production, Cost, and the Perfect Competition Model",
                &["marginal cost", "perfect competition", "production function"],
            ),
            unit(
                "unit-4",
                "Imperfect Competition",
                &["monopoly", "oligopoly", "game theory"],
            ),
            unit(
                "unit-6",
                "Market Failure and the Role of Government",
                &["externality", "public good", "market failure"],
            ),
        ],
        default_unit: "unit-2",
    },
    Course {
        id: "ap-computer-science-a",
        title: "AP Computer Science A",
        keywords: &["computer science", "apcsa", "csa", "java"],
        units: &[
            unit(
                "unit-1",
                "Primitive Types",
                &["primitive type", "variable declaration", "casting"],
            ),
            unit(
                "unit-2",
                "Using Objects",
                &["object reference", "string method", "constructor"],
            ),
            unit(
                "unit-4",
                "Iteration",
                &["loop", "iteration", "for loop", "while loop"],
            ),
            unit(
                "unit-6",
                "Array",
                &["array", "traversal"],
            ),
            unit(
                "unit-9",
                "Inheritance",
                &["inheritance", "polymorphism", "superclass", "subclass"],
            ),
            unit(
                "unit-10",
                "Recursion",
                &["recursion", "recursive", "binary search", "merge sort"],
            ),
        ],
        default_unit: "unit-1",
    },
    Course {
        id: "ap-psychology",
        title: "AP Psychology",
        keywords: &["psychology"],
        units: &[
            unit(
                "unit-2",
                "Biological Bases of Behavior",
                &["neuron", "neurotransmitter", "brain", "nervous system"],
            ),
            unit(
                "unit-4",
                "Learning",
                &["classical conditioning", "operant conditioning", "reinforcement"],
            ),
            unit(
                "unit-5",
                "Cognitive Psychology",
                &["memory", "cognition", "problem solving"],
            ),
            unit(
                "unit-8",
                "Clinical Psychology",
                &["disorder", "therapy", "depression", "anxiety"],
            ),
        ],
        default_unit: "unit-2",
    },
];
