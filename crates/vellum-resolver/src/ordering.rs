//! Dependency ordering of loaded packages.
//!
//! Once every requested package is on hand, the tree is flattened
//! into the order the document inflater merges packages: a package's
//! imports always precede it, shared imports are placed once, and
//! `loadAfter` reorders siblings under a parent. A package counts as
//! available to a `loadAfter` wait as soon as any parent has placed
//! it in the output.

use crate::error::Error;
use crate::import::ImportRef;
use crate::package::Package;
use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Why ordering failed, and the reference being placed at the time.
#[derive(Debug)]
pub(crate) struct OrderFailure {
    pub(crate) error: Error,
    pub(crate) reference: Option<ImportRef>,
}

impl OrderFailure {
    fn new(error: Error, reference: &ImportRef) -> Self {
        Self {
            error,
            reference: Some(reference.clone()),
        }
    }
}

/// Flatten `root` and everything beneath it into merge order.
///
/// `dependencies` maps a package name to the references it imports,
/// in document order; `loaded` holds the package fetched for each
/// reference. The root comes out last.
pub(crate) fn order_packages(
    root: &Arc<Package>,
    dependencies: &IndexMap<String, Vec<ImportRef>>,
    loaded: &AHashMap<ImportRef, Arc<Package>>,
) -> Result<Vec<Arc<Package>>, OrderFailure> {
    let mut orderer = Orderer {
        dependencies,
        loaded,
        ordered: Vec::new(),
        placed_packages: AHashSet::new(),
        available_names: AHashSet::new(),
        in_progress: AHashSet::new(),
    };
    orderer.place(root)?;
    Ok(orderer.ordered)
}

struct Orderer<'a> {
    dependencies: &'a IndexMap<String, Vec<ImportRef>>,
    loaded: &'a AHashMap<ImportRef, Arc<Package>>,
    ordered: Vec<Arc<Package>>,
    /// Qualified names already in `ordered`.
    placed_packages: AHashSet<String>,
    /// Bare import names whose package is in `ordered`; these satisfy
    /// `loadAfter` waits.
    available_names: AHashSet<String>,
    /// Packages on the recursion stack.
    in_progress: AHashSet<String>,
}

impl<'a> Orderer<'a> {
    fn place(&mut self, package: &Arc<Package>) -> Result<(), OrderFailure> {
        self.in_progress.insert(package.name().to_string());
        let dependencies = self.dependencies;
        if let Some(references) = dependencies.get(package.name()) {
            self.place_children(references)?;
        }
        self.in_progress.remove(package.name());
        self.placed_packages.insert(package.name().to_string());
        self.ordered.push(Arc::clone(package));
        Ok(())
    }

    fn place_children(&mut self, references: &'a [ImportRef]) -> Result<(), OrderFailure> {
        let mut queue: VecDeque<&ImportRef> = references.iter().collect();
        // (waiter, awaited) pairs already deferred once, to catch a
        // reverse pair on the second encounter.
        let mut deferred: AHashSet<(String, String)> = AHashSet::new();
        let mut deferrals_in_row = 0usize;

        while let Some(reference) = queue.pop_front() {
            let mut must_wait = false;
            for name in reference.load_after() {
                if self.available_names.contains(name.as_str()) {
                    continue;
                }
                if queue.is_empty() {
                    // Nothing left that could ever provide it.
                    return Err(OrderFailure::new(
                        Error::LoadAfterUnavailable {
                            dependency: name.clone(),
                            requester: reference.name().to_string(),
                        },
                        reference,
                    ));
                }
                if deferred.contains(&(name.clone(), reference.name().to_string())) {
                    return Err(OrderFailure::new(
                        Error::LoadAfterCycle {
                            first: reference.name().to_string(),
                            second: name.clone(),
                        },
                        reference,
                    ));
                }
                deferred.insert((reference.name().to_string(), name.clone()));
                must_wait = true;
            }

            if must_wait {
                queue.push_back(reference);
                deferrals_in_row += 1;
                if deferrals_in_row > queue.len() {
                    // A full sweep of the queue deferred every entry.
                    return Err(OrderFailure::new(Error::LoadAfterChain, reference));
                }
                continue;
            }
            deferrals_in_row = 0;

            let Some(child) = self.loaded.get(reference) else {
                return Err(OrderFailure::new(
                    Error::PackageNotLoaded {
                        reference: reference.qualified_name(),
                    },
                    reference,
                ));
            };
            let child = Arc::clone(child);

            if self.in_progress.contains(child.name()) {
                return Err(OrderFailure::new(
                    Error::CircularImport {
                        name: reference.name().to_string(),
                    },
                    reference,
                ));
            }
            if !self.placed_packages.contains(child.name()) {
                self.place(&child)?;
            }
            self.available_names.insert(reference.name().to_string());
        }
        Ok(())
    }
}
