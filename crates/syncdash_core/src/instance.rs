pub type InstanceId = u64;

/// Flat shared key mirroring the active instance id across contexts.
pub const ACTIVE_INSTANCE_KEY: &str = "active_instance_id";

/// A configured backend-connection profile. Credentials stay on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub woocommerce_url: String,
    pub odoo_url: String,
    pub odoo_db: Option<String>,
    pub odoo_language: Option<String>,
    pub is_active: bool,
}

impl Instance {
    pub fn new(id: InstanceId, name: impl Into<String>, is_active: bool) -> Self {
        Self {
            id,
            name: name.into(),
            woocommerce_url: String::new(),
            odoo_url: String::new(),
            odoo_db: None,
            odoo_language: None,
            is_active,
        }
    }
}

/// Local mirror of the server's instance collection and active selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceCache {
    instances: Vec<Instance>,
    active: Option<Instance>,
    loaded: bool,
    /// The active selection is a persisted hint the server has not confirmed.
    restored: bool,
}

impl InstanceCache {
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn active(&self) -> Option<&Instance> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<InstanceId> {
        self.active.as_ref().map(|instance| instance.id)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// True when the active selection came from the server rather than a
    /// persisted hint.
    pub fn active_is_confirmed(&self) -> bool {
        self.active.is_some() && !self.restored
    }

    pub fn active_count(&self) -> usize {
        self.instances.iter().filter(|i| i.is_active).count()
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.iter().find(|instance| instance.id == id)
    }

    /// Replaces the collection with a fresh server listing. The first entry
    /// flagged active wins; later ones are demoted so the cache never holds
    /// two. Returns how many entries were demoted.
    pub(crate) fn replace_all(&mut self, mut instances: Vec<Instance>) -> usize {
        let mut demoted = 0;
        let mut active = None;
        for instance in instances.iter_mut().filter(|i| i.is_active) {
            if active.is_none() {
                active = Some(instance.clone());
            } else {
                instance.is_active = false;
                demoted += 1;
            }
        }
        self.instances = instances;
        self.active = active;
        self.loaded = true;
        self.restored = false;
        demoted
    }

    /// Records `instance` as active and marks every other cached entry
    /// inactive.
    pub(crate) fn set_active(&mut self, mut instance: Instance) {
        instance.is_active = true;
        for cached in &mut self.instances {
            if cached.id == instance.id {
                *cached = instance.clone();
            } else {
                cached.is_active = false;
            }
        }
        self.active = Some(instance);
        self.restored = false;
    }

    pub(crate) fn clear_active(&mut self) {
        self.active = None;
        self.restored = false;
        for cached in &mut self.instances {
            cached.is_active = false;
        }
    }

    /// Seeds the active selection from a persisted snapshot. Ignored once a
    /// listing has been loaded.
    pub(crate) fn restore_active(&mut self, instance: Instance) -> bool {
        if self.loaded || self.active.is_some() {
            return false;
        }
        self.active = Some(Instance {
            is_active: true,
            ..instance
        });
        self.restored = true;
        true
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
