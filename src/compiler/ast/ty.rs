use std::fmt;

/// Size in bytes of a machine word on the target.
pub const WORD: i32 = 4;

/// Size in bytes of a byte-sized value (bool, char).
pub const BYTE: i32 = 1;

/**
 The types of the Bryony language.

 Arrays are kept in a normalised form: the element type of an `Array` is
 never itself an `Array`, nesting is folded into the dimension count. Pairs
 erase the element types of any nested pair, so `pair(pair(int, int), bool)`
 stores `pair(any, any)` as its first element type.

 `Any` is the wildcard produced for error-recovery nodes and for erased pair
 elements; it is compatible with every type so that one faulty subexpression
 does not cascade into a wall of follow-on errors.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Int,
    Bool,
    Char,
    String,
    Array(Box<Type>, usize),
    Pair(Box<Type>, Box<Type>),
    Function(Box<Type>, Vec<Type>),
    Any,
}

impl Type {
    /// Builds an array type, folding a nested array element into the
    /// dimension count.
    pub fn array(elem: Type, dim: usize) -> Type {
        match elem {
            Type::Array(inner, d) => Type::Array(inner, d + dim),
            other => Type::Array(Box::new(other), dim),
        }
    }

    /// Builds a pair type, erasing the element types of nested pairs.
    pub fn pair(fst: Type, snd: Type) -> Type {
        Type::Pair(Box::new(Self::erase(fst)), Box::new(Self::erase(snd)))
    }

    fn erase(ty: Type) -> Type {
        match ty {
            Type::Pair(..) => Type::Pair(Box::new(Type::Any), Box::new(Type::Any)),
            other => other,
        }
    }

    /// Type compatibility as used by every semantic check. Symmetric, but
    /// not transitive: `Any` is compatible with everything.
    pub fn compatible(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Int, Type::Int)
            | (Type::Bool, Type::Bool)
            | (Type::Char, Type::Char)
            | (Type::String, Type::String) => true,
            (Type::Array(e1, d1), Type::Array(e2, d2)) => {
                **e1 == Type::Any || **e2 == Type::Any || (d1 == d2 && e1.compatible(e2))
            }
            (Type::Pair(f1, s1), Type::Pair(f2, s2)) => {
                f1.compatible(f2) && s1.compatible(s2)
            }
            (Type::Function(r1, p1), Type::Function(r2, p2)) => {
                r1.compatible(r2)
                    && p1.len() == p2.len()
                    && p1.iter().zip(p2.iter()).all(|(a, b)| a.compatible(b))
            }
            _ => false,
        }
    }

    /// Size in bytes of a value of this type on the stack. Strings, arrays
    /// and pairs are heap handles and occupy one word.
    pub fn size(&self) -> i32 {
        match self {
            Type::Int | Type::String | Type::Array(..) | Type::Pair(..) => WORD,
            Type::Bool | Type::Char => BYTE,
            Type::Function(..) | Type::Any => 0,
        }
    }

    /// True for types whose values live on the heap and can be freed.
    pub fn is_heap_allocated(&self) -> bool {
        matches!(self, Type::Array(..) | Type::Pair(..))
    }

    /// The type obtained by applying `indices` index operations to this
    /// type. `None` if this type cannot be indexed that deep.
    pub fn indexed(&self, indices: usize) -> Option<Type> {
        match self {
            Type::Any => Some(Type::Any),
            Type::Array(elem, dim) => {
                if **elem == Type::Any {
                    Some(Type::Any)
                } else if indices < *dim {
                    Some(Type::Array(elem.clone(), dim - indices))
                } else if indices == *dim {
                    Some((**elem).clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Bool => f.write_str("bool"),
            Type::Char => f.write_str("char"),
            Type::String => f.write_str("string"),
            Type::Array(elem, dim) => {
                write!(f, "{}", elem)?;
                for _ in 0..*dim {
                    f.write_str("[]")?;
                }
                Ok(())
            }
            Type::Pair(fst, snd) => write!(f, "pair({}, {})", fst, snd),
            Type::Function(ret, params) => {
                f.write_str("fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Any => f.write_str("any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_is_compatible_with_everything() {
        let tys = [
            Type::Int,
            Type::Bool,
            Type::Char,
            Type::String,
            Type::array(Type::Int, 2),
            Type::pair(Type::Int, Type::Bool),
        ];
        for ty in &tys {
            assert!(Type::Any.compatible(ty), "any vs {}", ty);
            assert!(ty.compatible(&Type::Any), "{} vs any", ty);
        }
    }

    #[test]
    fn base_types_only_match_themselves() {
        assert!(Type::Int.compatible(&Type::Int));
        assert!(!Type::Int.compatible(&Type::Char));
        assert!(!Type::Bool.compatible(&Type::Int));
        assert!(!Type::String.compatible(&Type::Char));
    }

    #[test]
    fn array_nesting_is_normalised() {
        let nested = Type::array(Type::array(Type::Int, 1), 1);
        assert_eq!(nested, Type::Array(Box::new(Type::Int), 2));
        assert!(nested.compatible(&Type::array(Type::Int, 2)));
        assert!(!nested.compatible(&Type::array(Type::Int, 1)));
    }

    #[test]
    fn array_with_any_element_matches_any_dimension() {
        let unknown = Type::Array(Box::new(Type::Any), 1);
        assert!(unknown.compatible(&Type::array(Type::Int, 3)));
        assert!(Type::array(Type::Char, 1).compatible(&unknown));
    }

    #[test]
    fn pair_elements_are_erased_one_level_down() {
        let outer = Type::pair(Type::pair(Type::Int, Type::Int), Type::Bool);
        assert_eq!(
            outer,
            Type::Pair(
                Box::new(Type::Pair(Box::new(Type::Any), Box::new(Type::Any))),
                Box::new(Type::Bool)
            )
        );
        // Erasure makes any inner pair shape acceptable.
        assert!(outer.compatible(&Type::pair(Type::pair(Type::Char, Type::Bool), Type::Bool)));
        assert!(!outer.compatible(&Type::pair(Type::Int, Type::Bool)));
    }

    #[test]
    fn sizes() {
        assert_eq!(Type::Int.size(), 4);
        assert_eq!(Type::Bool.size(), 1);
        assert_eq!(Type::Char.size(), 1);
        assert_eq!(Type::String.size(), 4);
        assert_eq!(Type::array(Type::Char, 1).size(), 4);
        assert_eq!(Type::pair(Type::Int, Type::Int).size(), 4);
    }

    #[test]
    fn indexing_peels_dimensions() {
        let arr = Type::array(Type::Int, 2);
        assert_eq!(arr.indexed(1), Some(Type::array(Type::Int, 1)));
        assert_eq!(arr.indexed(2), Some(Type::Int));
        assert_eq!(arr.indexed(3), None);
        assert_eq!(Type::Int.indexed(1), None);
    }

    #[test]
    fn display() {
        assert_eq!(Type::array(Type::Int, 2).to_string(), "int[][]");
        assert_eq!(
            Type::pair(Type::Int, Type::array(Type::Char, 1)).to_string(),
            "pair(int, char[])"
        );
        assert_eq!(
            Type::Function(Box::new(Type::Bool), vec![Type::Int, Type::Char]).to_string(),
            "fn(int, char) -> bool"
        );
    }
}
