//! Skeletons and the skeleton registry
//!
//! A [`Skeleton`] is an immutable joint hierarchy validated on construction.
//! Skeletons are owned by a [`SkeletonRegistry`] and referenced by
//! [`SkeletonId`]; releasing an id drops the registry's reference while clips
//! or samplers that already resolved it keep working until they let go.

use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::AnimationError;

/// Hard ceiling on joints per skeleton, shared with the GPU joint buffer.
pub const MAX_JOINTS: usize = 64;

/// A single joint in a skeleton
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    /// Joint name
    pub name: String,
    /// Parent joint index (`None` for a root)
    pub parent: Option<u8>,
    /// Transforms from model bind space into this joint's space
    pub inverse_bind_pose: Mat4,
}

impl Joint {
    /// Create a root joint with an identity bind pose
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            inverse_bind_pose: Mat4::IDENTITY,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: u8) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_inverse_bind_pose(mut self, inverse_bind_pose: Mat4) -> Self {
        self.inverse_bind_pose = inverse_bind_pose;
        self
    }
}

/// Identifier of a registered skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkeletonId(u32);

impl SkeletonId {
    /// Get the raw id value.
    #[must_use]
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A validated joint hierarchy.
#[derive(Debug, Clone)]
pub struct Skeleton {
    joints: Vec<Joint>,
    /// Applied after the joint chain, undoing the mesh root transform
    root_inverse_transform: Mat4,
    /// Joint indices ordered so that every parent precedes its children
    eval_order: Vec<u8>,
}

impl Skeleton {
    /// Build a skeleton, rejecting oversized, dangling or cyclic hierarchies.
    ///
    /// # Errors
    ///
    /// `TooManyJoints` above [`MAX_JOINTS`], `InvalidParent` when a parent
    /// index is out of range, self-referencing, or part of a cycle.
    pub fn new(joints: Vec<Joint>) -> Result<Self, AnimationError> {
        if joints.len() > MAX_JOINTS {
            return Err(AnimationError::TooManyJoints {
                joints: joints.len(),
                max: MAX_JOINTS,
            });
        }

        let mut children: Vec<Vec<u8>> = vec![Vec::new(); joints.len()];
        let mut roots = Vec::new();
        for (index, joint) in joints.iter().enumerate() {
            match joint.parent {
                None => roots.push(index as u8),
                Some(p) if usize::from(p) >= joints.len() || usize::from(p) == index => {
                    return Err(AnimationError::InvalidParent { joint: index });
                }
                Some(p) => children[usize::from(p)].push(index as u8),
            }
        }

        // Depth-first from the roots; anything unreached sits on a cycle.
        let mut eval_order = Vec::with_capacity(joints.len());
        let mut stack: Vec<u8> = roots.into_iter().rev().collect();
        while let Some(index) = stack.pop() {
            eval_order.push(index);
            stack.extend(children[usize::from(index)].iter().rev());
        }

        if eval_order.len() != joints.len() {
            let mut seen = vec![false; joints.len()];
            for &i in &eval_order {
                seen[usize::from(i)] = true;
            }
            let joint = seen.iter().position(|s| !s).unwrap_or(0);
            return Err(AnimationError::InvalidParent { joint });
        }

        Ok(Self {
            joints,
            root_inverse_transform: Mat4::IDENTITY,
            eval_order,
        })
    }

    #[must_use]
    pub fn with_root_inverse_transform(mut self, transform: Mat4) -> Self {
        self.root_inverse_transform = transform;
        self
    }

    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    #[must_use]
    pub const fn root_inverse_transform(&self) -> Mat4 {
        self.root_inverse_transform
    }

    /// Joint indices, parents first.
    #[must_use]
    pub fn eval_order(&self) -> &[u8] {
        &self.eval_order
    }

    /// Find a joint by name
    #[must_use]
    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }
}

/// Owning table of skeletons keyed by [`SkeletonId`].
#[derive(Debug, Default)]
pub struct SkeletonRegistry {
    skeletons: FxHashMap<SkeletonId, Arc<Skeleton>>,
    next_id: u32,
}

impl SkeletonRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a skeleton and hand back its id.
    pub fn register(&mut self, skeleton: Skeleton) -> SkeletonId {
        let id = SkeletonId(self.next_id);
        self.next_id += 1;
        self.skeletons.insert(id, Arc::new(skeleton));
        id
    }

    /// Drop a skeleton. Returns `false` if the id was not registered.
    pub fn release(&mut self, id: SkeletonId) -> bool {
        self.skeletons.remove(&id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: SkeletonId) -> Option<&Arc<Skeleton>> {
        self.skeletons.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: SkeletonId) -> bool {
        self.skeletons.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.skeletons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }

    /// Release every skeleton.
    pub fn clear(&mut self) {
        self.skeletons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_order_puts_parents_first() {
        // Child stored before its parent.
        let skeleton = Skeleton::new(vec![
            Joint::new("hand").with_parent(2),
            Joint::new("hip"),
            Joint::new("arm").with_parent(1),
        ])
        .unwrap();

        let order = skeleton.eval_order();
        let pos = |j: u8| order.iter().position(|&i| i == j).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(0));
        assert_eq!(skeleton.find_joint("arm"), Some(2));
    }

    #[test]
    fn test_rejects_cycles_and_bad_parents() {
        let cycle = Skeleton::new(vec![
            Joint::new("root"),
            Joint::new("a").with_parent(2),
            Joint::new("b").with_parent(1),
        ]);
        assert!(matches!(cycle, Err(AnimationError::InvalidParent { joint: 1 })));

        let dangling = Skeleton::new(vec![Joint::new("a").with_parent(7)]);
        assert!(matches!(dangling, Err(AnimationError::InvalidParent { joint: 0 })));

        let own_parent = Skeleton::new(vec![Joint::new("a").with_parent(0)]);
        assert!(own_parent.is_err());
    }

    #[test]
    fn test_rejects_more_than_max_joints() {
        let joints = (0..=MAX_JOINTS).map(|i| Joint::new(format!("j{i}"))).collect();
        assert!(matches!(
            Skeleton::new(joints),
            Err(AnimationError::TooManyJoints { joints: 65, max: 64 })
        ));
    }

    #[test]
    fn test_registry_release() {
        let mut registry = SkeletonRegistry::new();
        let a = registry.register(Skeleton::new(vec![Joint::new("root")]).unwrap());
        let b = registry.register(Skeleton::new(vec![Joint::new("root")]).unwrap());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.release(a));
        assert!(!registry.release(a));
        assert!(registry.get(a).is_none());
        assert!(registry.contains(b));
    }
}
