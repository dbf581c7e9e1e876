use std::ops::{Index, IndexMut};

/// Surface shading model. The discriminant is the material ordinal and
/// fixes the order in which geometry passes draw buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialKind {
    Diffuse = 0,
    Microfacets = 1,
}

impl MaterialKind {
    pub const COUNT: usize = 2;
    /// Every kind, in ascending ordinal order.
    pub const ALL: [MaterialKind; Self::COUNT] = [MaterialKind::Diffuse, MaterialKind::Microfacets];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MaterialKind::Diffuse => "Diffuse",
            MaterialKind::Microfacets => "Microfacets",
        }
    }
}

/// One value per material kind, iterated in ordinal order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerMaterial<T>([T; MaterialKind::COUNT]);

impl<T> PerMaterial<T> {
    pub fn from_fn(mut f: impl FnMut(MaterialKind) -> T) -> Self {
        Self(std::array::from_fn(|i| f(MaterialKind::ALL[i])))
    }

    /// Builds values in ordinal order, stopping at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(MaterialKind) -> Result<T, E>) -> Result<Self, E> {
        let [diffuse, microfacets] = MaterialKind::ALL;
        let diffuse = f(diffuse)?;
        let microfacets = f(microfacets)?;
        Ok(Self([diffuse, microfacets]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialKind, &T)> {
        MaterialKind::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MaterialKind, &mut T)> {
        MaterialKind::ALL.into_iter().zip(self.0.iter_mut())
    }

    pub fn values(&self) -> &[T] {
        &self.0
    }
}

impl<T> Index<MaterialKind> for PerMaterial<T> {
    type Output = T;

    fn index(&self, kind: MaterialKind) -> &T {
        &self.0[kind.ordinal()]
    }
}

impl<T> IndexMut<MaterialKind> for PerMaterial<T> {
    fn index_mut(&mut self, kind: MaterialKind) -> &mut T {
        &mut self.0[kind.ordinal()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_declaration_order() {
        let ordinals: Vec<_> = MaterialKind::ALL.iter().map(|k| k.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1]);
        assert!(MaterialKind::Diffuse < MaterialKind::Microfacets);
    }

    #[test]
    fn try_from_fn_stops_at_first_error() {
        let mut visited = Vec::new();
        let result: Result<PerMaterial<u32>, &str> = PerMaterial::try_from_fn(|kind| {
            visited.push(kind);
            match kind {
                MaterialKind::Diffuse => Err("no diffuse"),
                MaterialKind::Microfacets => Ok(1),
            }
        });
        assert_eq!(result, Err("no diffuse"));
        assert_eq!(visited, vec![MaterialKind::Diffuse]);
    }

    #[test]
    fn per_material_iterates_in_ordinal_order() {
        let mut names = PerMaterial::from_fn(|kind| kind.name().to_owned());
        names[MaterialKind::Microfacets].push('!');
        let collected: Vec<_> = names.iter().map(|(k, v)| (k, v.as_str())).collect();
        assert_eq!(
            collected,
            vec![
                (MaterialKind::Diffuse, "Diffuse"),
                (MaterialKind::Microfacets, "Microfacets!"),
            ]
        );
    }
}
