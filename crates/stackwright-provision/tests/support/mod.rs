// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared in-memory fakes for the workflow integration tests.
//!
//! `FakeCloud` implements every cloud API seam against one mutexed state
//! blob and records every mutating or polled call in order, so tests can
//! assert sequencing invariants (e.g. load balancers observed gone before
//! the first node pool stack delete) and not just end states.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use stackwright_cloud::{
    Address, CloudClientFactory, CloudError, CloudSession, CreateLoadBalancerInput,
    CreateStackInput, DeleteStackInput, GroupInstance, IamApi, ImageApi, KeyPair, KeyPairApi,
    LoadBalancer, LoadBalancerApi, MachineImage, NetworkApi, NetworkInterface, OidcApi,
    OidcClient, ScalingApi, ScalingGroup, SpotRequest, Stack, StackApi, StackEvent, StackState,
    Tag, UpdateStackInput,
};
use stackwright_model::{
    AccessorError, Cluster, ClusterNetwork, ClusterStatus, ClusterAccessor, NodePoolRole,
    NodePoolSpec, Provider, ProvisioningRequest, Secret, SecretError, SecretRequest, SecretStore,
};
use stackwright_provision::activities::cluster::CaProvider;
use stackwright_provision::activities::external::{DnsApi, KubernetesApi, KubernetesError};
use stackwright_provision::activities::stack::{StackKind, TemplateCatalog};
use stackwright_provision::config::Config;
use stackwright_provision::image::{GpuImageTable, ImageSelectorChain, RegionImageTable};
use stackwright_provision::{activities::Dependencies, register_all};
use stackwright_runtime::{
    ActivityOptions, LocalRuntime, Workflow, WorkflowContext, WorkflowError,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const REGION: &str = "eu-west-1";
pub const GENERAL_IMAGE: &str = "ami-general";
pub const GPU_IMAGE: &str = "ami-gpu";

// ============================================================================
// Fake cloud
// ============================================================================

#[derive(Default)]
pub struct CloudState {
    pub stacks: BTreeMap<String, Stack>,
    pub stack_parameters: BTreeMap<String, BTreeMap<String, String>>,
    pub groups: BTreeMap<String, ScalingGroup>,
    pub spot_requests: BTreeMap<String, Vec<SpotRequest>>,
    pub addresses: Vec<(Address, Vec<Tag>)>,
    pub balancers: Vec<(LoadBalancer, Vec<Tag>)>,
    /// When non-zero, each load balancer describe decrements this; the
    /// balancers disappear once it reaches zero.
    pub lb_gone_after_describes: u32,
    pub key_pairs: BTreeMap<String, KeyPair>,
    pub images: BTreeMap<String, MachineImage>,
    pub interfaces: Vec<(NetworkInterface, Vec<Tag>)>,
    pub access_keys: BTreeMap<String, Vec<String>>,
    pub oidc_clients: BTreeMap<String, OidcClient>,
    /// Every call that matters for ordering assertions, in dispatch order.
    pub calls: Vec<String>,
    next_allocation: u32,
}

pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        let mut state = CloudState::default();
        state.images.insert(
            GENERAL_IMAGE.to_string(),
            MachineImage {
                id: GENERAL_IMAGE.to_string(),
                block_device_size_gb: 20,
            },
        );
        state.images.insert(
            GPU_IMAGE.to_string(),
            MachineImage {
                id: GPU_IMAGE.to_string(),
                block_device_size_gb: 40,
            },
        );
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut CloudState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Index of the first call matching the prefix, panicking when absent.
    pub fn first_call_index(&self, prefix: &str) -> usize {
        let calls = self.calls();
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with '{prefix}' in {calls:?}"))
    }

    /// Index of the last call matching the prefix, panicking when absent.
    pub fn last_call_index(&self, prefix: &str) -> usize {
        let calls = self.calls();
        calls
            .iter()
            .rposition(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with '{prefix}' in {calls:?}"))
    }

    /// Seed an already-created stack, as a finished earlier run would have
    /// left it.
    pub fn seed_stack(&self, name: &str, outputs: &[(&str, &str)]) {
        self.with_state(|state| {
            state.stacks.insert(
                name.to_string(),
                Stack {
                    name: name.to_string(),
                    state: StackState::CreateComplete,
                    outputs: outputs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    status_reason: None,
                },
            );
        });
    }

    pub fn seed_group(&self, name: &str, min: u32, max: u32, desired: u32) {
        self.with_state(|state| {
            state.groups.insert(name.to_string(), healthy_group(name, min, max, desired));
        });
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn healthy_group(name: &str, min: u32, max: u32, desired: u32) -> ScalingGroup {
    ScalingGroup {
        name: name.to_string(),
        min_size: min,
        max_size: max,
        desired_capacity: desired,
        instances: (0..desired)
            .map(|i| GroupInstance {
                id: format!("i-{name}-{i}"),
                health_status: "Healthy".to_string(),
                lifecycle_state: "InService".to_string(),
            })
            .collect(),
    }
}

fn parse_count(parameters: &BTreeMap<String, String>, key: &str) -> u32 {
    parameters.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[async_trait]
impl StackApi for FakeCloud {
    async fn create_stack(&self, input: CreateStackInput) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create-stack:{}", input.name));
        if state.stacks.contains_key(&input.name) {
            return Err(CloudError::api(
                "AlreadyExistsException",
                format!("stack {} already exists", input.name),
            ));
        }

        let mut outputs = BTreeMap::new();
        if input.name.starts_with("stackwright-network-") {
            outputs.insert("VpcId".to_string(), "vpc-00000001".to_string());
        } else if input.name.starts_with("stackwright-subnet-") {
            let zone = input
                .parameters
                .get("AvailabilityZone")
                .cloned()
                .unwrap_or_default();
            outputs.insert("SubnetId".to_string(), format!("subnet-{zone}"));
        } else if input.name.starts_with("stackwright-master-")
            || input.name.starts_with("stackwright-nodepool-")
        {
            // The pool stacks own a scaling group named after the stack;
            // a fresh group comes up healthy at its desired capacity.
            let group = healthy_group(
                &input.name,
                parse_count(&input.parameters, "MinSize"),
                parse_count(&input.parameters, "MaxSize"),
                parse_count(&input.parameters, "DesiredCapacity"),
            );
            state.groups.insert(input.name.clone(), group);
        }

        state.stack_parameters.insert(input.name.clone(), input.parameters);
        state.stacks.insert(
            input.name.clone(),
            Stack {
                name: input.name,
                state: StackState::CreateComplete,
                outputs,
                status_reason: None,
            },
        );
        Ok(())
    }

    async fn update_stack(&self, input: UpdateStackInput) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update-stack:{}", input.name));
        if !state.stacks.contains_key(&input.name) {
            return Err(CloudError::not_found(format!("stack {}", input.name)));
        }
        if state.stack_parameters.get(&input.name) == Some(&input.parameters) {
            return Err(CloudError::api(
                "ValidationError",
                "No updates are to be performed.",
            ));
        }
        state.stack_parameters.insert(input.name.clone(), input.parameters);
        if let Some(stack) = state.stacks.get_mut(&input.name) {
            stack.state = StackState::UpdateComplete;
        }
        Ok(())
    }

    async fn delete_stack(&self, input: DeleteStackInput) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete-stack:{}", input.name));
        if state.stacks.remove(&input.name).is_none() {
            return Err(CloudError::not_found(format!("stack {}", input.name)));
        }
        state.stack_parameters.remove(&input.name);
        state.groups.remove(&input.name);
        Ok(())
    }

    async fn describe_stack(&self, name: &str) -> Result<Option<Stack>, CloudError> {
        Ok(self.state.lock().unwrap().stacks.get(name).cloned())
    }

    async fn stack_events(&self, _name: &str) -> Result<Vec<StackEvent>, CloudError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl ScalingApi for FakeCloud {
    async fn describe_group(&self, name: &str) -> Result<Option<ScalingGroup>, CloudError> {
        Ok(self.state.lock().unwrap().groups.get(name).cloned())
    }

    async fn update_group(
        &self,
        name: &str,
        min_size: u32,
        max_size: u32,
        desired_capacity: u32,
    ) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("update-group:{name}:{min_size}:{max_size}:{desired_capacity}"));
        match state.groups.get_mut(name) {
            Some(group) => {
                group.min_size = min_size;
                group.max_size = max_size;
                group.desired_capacity = desired_capacity;
                Ok(())
            }
            None => Err(CloudError::not_found(format!("scaling group {name}"))),
        }
    }

    async fn spot_requests_for_group(&self, name: &str) -> Result<Vec<SpotRequest>, CloudError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .spot_requests
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl NetworkApi for FakeCloud {
    async fn allocate_address(&self, tags: Vec<Tag>) -> Result<Address, CloudError> {
        let mut state = self.state.lock().unwrap();
        state.next_allocation += 1;
        let n = state.next_allocation;
        let address = Address {
            allocation_id: format!("eipalloc-{n}"),
            public_ip: format!("198.51.100.{n}"),
        };
        state.calls.push(format!("allocate-address:{}", address.allocation_id));
        state.addresses.push((address.clone(), tags));
        Ok(address)
    }

    async fn find_address_by_tag(&self, tag: &Tag) -> Result<Option<Address>, CloudError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .addresses
            .iter()
            .find(|(_, tags)| tags.contains(tag))
            .map(|(address, _)| address.clone()))
    }

    async fn release_address(&self, allocation_id: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("release-address:{allocation_id}"));
        let before = state.addresses.len();
        state.addresses.retain(|(a, _)| a.allocation_id != allocation_id);
        if state.addresses.len() == before {
            return Err(CloudError::not_found(format!("address {allocation_id}")));
        }
        Ok(())
    }

    async fn default_security_group(&self, _vpc_id: &str) -> Result<String, CloudError> {
        Ok("sg-default".to_string())
    }

    async fn detached_interfaces_by_tag(
        &self,
        tag: &Tag,
    ) -> Result<Vec<NetworkInterface>, CloudError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .interfaces
            .iter()
            .filter(|(i, tags)| !i.attached && tags.contains(tag))
            .map(|(i, _)| i.clone())
            .collect())
    }

    async fn delete_interface(&self, interface_id: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete-interface:{interface_id}"));
        state.interfaces.retain(|(i, _)| i.id != interface_id);
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerApi for FakeCloud {
    async fn create_network_load_balancer(
        &self,
        input: CreateLoadBalancerInput,
    ) -> Result<LoadBalancer, CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create-lb:{}", input.name));
        let lb = LoadBalancer {
            arn: format!("arn:lb:{}", input.name),
            name: input.name.clone(),
            dns_name: format!("{}.elb.example.com", input.name),
        };
        state.balancers.push((lb.clone(), input.tags));
        Ok(lb)
    }

    async fn find_by_tag(&self, tag: &Tag) -> Result<Vec<LoadBalancer>, CloudError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .balancers
            .iter()
            .filter(|(_, tags)| tags.contains(tag))
            .map(|(lb, _)| lb.clone())
            .collect())
    }

    async fn describe(&self, arn: &str) -> Result<Option<LoadBalancer>, CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("describe-lb:{arn}"));
        if state.lb_gone_after_describes > 0 {
            state.lb_gone_after_describes -= 1;
            if state.lb_gone_after_describes == 0 {
                state.balancers.clear();
            }
        }
        Ok(state
            .balancers
            .iter()
            .find(|(lb, _)| lb.arn == arn)
            .map(|(lb, _)| lb.clone()))
    }
}

#[async_trait]
impl KeyPairApi for FakeCloud {
    async fn describe_key_pair(&self, name: &str) -> Result<Option<KeyPair>, CloudError> {
        Ok(self.state.lock().unwrap().key_pairs.get(name).cloned())
    }

    async fn import_key_pair(
        &self,
        name: &str,
        _public_key: &str,
        _tags: Vec<Tag>,
    ) -> Result<KeyPair, CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("import-key:{name}"));
        let key = KeyPair {
            name: name.to_string(),
            fingerprint: "aa:bb:cc:dd".to_string(),
        };
        state.key_pairs.insert(name.to_string(), key.clone());
        Ok(key)
    }

    async fn delete_key_pair(&self, name: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete-key:{name}"));
        if state.key_pairs.remove(name).is_none() {
            return Err(CloudError::not_found(format!("key pair {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageApi for FakeCloud {
    async fn describe_image(&self, image_id: &str) -> Result<Option<MachineImage>, CloudError> {
        Ok(self.state.lock().unwrap().images.get(image_id).cloned())
    }
}

#[async_trait]
impl IamApi for FakeCloud {
    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>, CloudError> {
        let state = self.state.lock().unwrap();
        match state.access_keys.get(user_name) {
            Some(keys) => Ok(keys.clone()),
            None => Err(CloudError::not_found(format!("user {user_name}"))),
        }
    }

    async fn delete_access_key(&self, user_name: &str, key_id: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete-access-key:{user_name}:{key_id}"));
        if let Some(keys) = state.access_keys.get_mut(user_name) {
            keys.retain(|k| k != key_id);
        }
        Ok(())
    }
}

#[async_trait]
impl OidcApi for FakeCloud {
    async fn create_client(
        &self,
        cluster_uid: &str,
        _redirect_url: &str,
    ) -> Result<OidcClient, CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create-oidc-client:{cluster_uid}"));
        let client = OidcClient {
            client_id: format!("oidc-{cluster_uid}"),
            client_secret: "s3cret".to_string(),
        };
        state.oidc_clients.insert(cluster_uid.to_string(), client.clone());
        Ok(client)
    }

    async fn delete_client(&self, client_id: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete-oidc-client:{client_id}"));
        state.oidc_clients.retain(|_, c| c.client_id != client_id);
        Ok(())
    }
}

pub struct FakeFactory {
    cloud: Arc<FakeCloud>,
}

#[async_trait]
impl CloudClientFactory for FakeFactory {
    async fn session(
        &self,
        _organization_id: u64,
        _secret_id: &str,
        region: &str,
    ) -> Result<CloudSession, CloudError> {
        Ok(CloudSession {
            region: region.to_string(),
            stacks: self.cloud.clone(),
            scaling: self.cloud.clone(),
            network: self.cloud.clone(),
            load_balancers: self.cloud.clone(),
            key_pairs: self.cloud.clone(),
            images: self.cloud.clone(),
            iam: self.cloud.clone(),
            oidc: self.cloud.clone(),
        })
    }
}

// ============================================================================
// Persistence fakes
// ============================================================================

#[derive(Default)]
pub struct InMemoryClusters {
    records: Mutex<BTreeMap<u64, Cluster>>,
    statuses: Mutex<Vec<(u64, ClusterStatus, String)>>,
}

impl InMemoryClusters {
    pub fn insert(&self, cluster: Cluster) {
        self.records.lock().unwrap().insert(cluster.id, cluster);
    }

    pub fn get(&self, cluster_id: u64) -> Option<Cluster> {
        self.records.lock().unwrap().get(&cluster_id).cloned()
    }

    pub fn status_history(&self, cluster_id: u64) -> Vec<ClusterStatus> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == cluster_id)
            .map(|(_, status, _)| *status)
            .collect()
    }
}

#[async_trait]
impl ClusterAccessor for InMemoryClusters {
    async fn get_cluster(&self, cluster_id: u64) -> Result<Cluster, AccessorError> {
        self.records
            .lock()
            .unwrap()
            .get(&cluster_id)
            .cloned()
            .ok_or(AccessorError::NotFound { cluster_id })
    }

    async fn get_node_pools(&self, cluster_id: u64) -> Result<Vec<NodePoolSpec>, AccessorError> {
        Ok(self.get_cluster(cluster_id).await?.node_pools)
    }

    async fn update_status(
        &self,
        cluster_id: u64,
        status: ClusterStatus,
        message: &str,
    ) -> Result<(), AccessorError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&cluster_id)
            .ok_or(AccessorError::NotFound { cluster_id })?;
        record.status = status;
        record.status_message = message.to_string();
        self.statuses
            .lock()
            .unwrap()
            .push((cluster_id, status, message.to_string()));
        Ok(())
    }

    async fn persist(&self, cluster: &Cluster) -> Result<(), AccessorError> {
        self.records
            .lock()
            .unwrap()
            .insert(cluster.id, cluster.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySecrets {
    secrets: Mutex<BTreeMap<String, Secret>>,
    next_id: Mutex<u32>,
}

impl InMemorySecrets {
    pub fn insert(&self, secret: Secret) {
        self.secrets
            .lock()
            .unwrap()
            .insert(secret.id.clone(), secret);
    }

    pub fn by_name(&self, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .values()
            .find(|s| s.name == name)
            .cloned()
    }
}

#[async_trait]
impl SecretStore for InMemorySecrets {
    async fn get(&self, organization_id: u64, secret_id: &str) -> Result<Secret, SecretError> {
        self.secrets
            .lock()
            .unwrap()
            .get(secret_id)
            .cloned()
            .ok_or_else(|| SecretError::NotFound {
                reference: secret_id.to_string(),
                organization_id,
            })
    }

    async fn get_by_name(&self, organization_id: u64, name: &str) -> Result<Secret, SecretError> {
        self.by_name(name).ok_or_else(|| SecretError::NotFound {
            reference: name.to_string(),
            organization_id,
        })
    }

    async fn store(
        &self,
        organization_id: u64,
        request: SecretRequest,
    ) -> Result<String, SecretError> {
        if self.by_name(&request.name).is_some() {
            return Err(SecretError::AlreadyExists {
                name: request.name,
                organization_id,
            });
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let id = format!("secret-{}", *next);
        self.insert(Secret {
            id: id.clone(),
            name: request.name,
            kind: request.kind,
            values: request.values,
        });
        Ok(id)
    }

    async fn update(
        &self,
        organization_id: u64,
        secret_id: &str,
        request: SecretRequest,
    ) -> Result<(), SecretError> {
        let mut secrets = self.secrets.lock().unwrap();
        match secrets.get_mut(secret_id) {
            Some(secret) => {
                secret.kind = request.kind;
                secret.values = request.values;
                Ok(())
            }
            None => Err(SecretError::NotFound {
                reference: secret_id.to_string(),
                organization_id,
            }),
        }
    }

    async fn delete(&self, organization_id: u64, secret_id: &str) -> Result<(), SecretError> {
        match self.secrets.lock().unwrap().remove(secret_id) {
            Some(_) => Ok(()),
            None => Err(SecretError::NotFound {
                reference: secret_id.to_string(),
                organization_id,
            }),
        }
    }
}

// ============================================================================
// External seam fakes
// ============================================================================

pub struct StaticTemplates;

impl TemplateCatalog for StaticTemplates {
    fn template(&self, _kind: StackKind) -> String {
        "{}".to_string()
    }
}

pub struct StaticCa;

#[async_trait]
impl CaProvider for StaticCa {
    async fn generate(&self, _cluster_uid: &str) -> Result<BTreeMap<String, String>, SecretError> {
        Ok([("ca".to_string(), "-----BEGIN CERTIFICATE-----".to_string())].into())
    }
}

#[derive(Default)]
pub struct RecordingKubernetes {
    evacuate_error: Mutex<Option<KubernetesError>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingKubernetes {
    pub fn fail_evacuation(&self, err: KubernetesError) {
        *self.evacuate_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl KubernetesApi for RecordingKubernetes {
    async fn evacuate_cluster(&self, cluster_id: u64) -> Result<(), KubernetesError> {
        self.calls.lock().unwrap().push(format!("evacuate:{cluster_id}"));
        match self.evacuate_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn allow_workloads_on_master(&self, cluster_id: u64) -> Result<(), KubernetesError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("allow-workloads:{cluster_id}"));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDns {
    calls: Mutex<Vec<String>>,
}

impl RecordingDns {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsApi for RecordingDns {
    async fn delete_cluster_records(
        &self,
        organization_id: u64,
        cluster_uid: &str,
    ) -> Result<(), KubernetesError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete-records:{organization_id}:{cluster_uid}"));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Drives one named activity with a proper activity context, for tests that
/// exercise an activity contract outside a full workflow.
pub struct ActivityProbe;

pub const PROBE: &str = "probe";

#[derive(serde::Serialize, serde::Deserialize)]
pub struct ProbeInput {
    pub activity: String,
    pub input: Value,
}

#[async_trait]
impl Workflow for ActivityProbe {
    type Input = ProbeInput;
    type Output = Value;

    fn name(&self) -> &'static str {
        PROBE
    }

    async fn run(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        input: Self::Input,
    ) -> Result<Value, WorkflowError> {
        Ok(ctx
            .execute_activity(&input.activity, input.input, ActivityOptions::short())
            .await?)
    }
}

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub clusters: Arc<InMemoryClusters>,
    pub secrets: Arc<InMemorySecrets>,
    pub kubernetes: Arc<RecordingKubernetes>,
    pub dns: Arc<RecordingDns>,
    pub config: Config,
    pub runtime: LocalRuntime,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    let cloud = FakeCloud::new();
    let clusters = Arc::new(InMemoryClusters::default());
    let secrets = Arc::new(InMemorySecrets::default());
    let kubernetes = Arc::new(RecordingKubernetes::default());
    let dns = Arc::new(RecordingDns::default());

    secrets.insert(Secret {
        id: "secret-aws".to_string(),
        name: "aws-credential".to_string(),
        kind: "amazon".to_string(),
        values: [
            ("access_key".to_string(), "AKIATEST".to_string()),
            ("secret_key".to_string(), "hunter2".to_string()),
        ]
        .into(),
    });
    secrets.insert(Secret {
        id: "secret-ssh".to_string(),
        name: "cluster-ssh".to_string(),
        kind: "ssh".to_string(),
        values: [(
            "public_key".to_string(),
            "ssh-rsa AAAAB3NzaC1yc2E test@stackwright".to_string(),
        )]
        .into(),
    });

    let chain = ImageSelectorChain::new(vec![
        Box::new(RegionImageTable::new().insert(REGION, &config.kubernetes_version, GENERAL_IMAGE)),
        Box::new(GpuImageTable::new().insert(REGION, &config.kubernetes_version, GPU_IMAGE)),
    ]);

    let deps = Dependencies {
        factory: Arc::new(FakeFactory {
            cloud: cloud.clone(),
        }),
        templates: Arc::new(StaticTemplates),
        clusters: clusters.clone(),
        secrets: secrets.clone(),
        images: Arc::new(chain),
        ca: Arc::new(StaticCa),
        kubernetes: kubernetes.clone(),
        dns: dns.clone(),
        config: config.clone(),
    };

    let runtime = register_all(LocalRuntime::builder(), deps)
        .workflow(ActivityProbe)
        .build();

    Harness {
        cloud,
        clusters,
        secrets,
        kubernetes,
        dns,
        config,
        runtime,
    }
}

impl Harness {
    /// Seed the cluster record the workflows read and write.
    pub fn seed_cluster(&self, request: &ProvisioningRequest) {
        self.clusters.insert(Cluster {
            id: request.cluster_id,
            uid: request.cluster_uid.clone(),
            name: request.cluster_name.clone(),
            organization_id: request.organization_id,
            region: request.region.clone(),
            status: ClusterStatus::Creating,
            status_message: String::new(),
            network: ClusterNetwork::default(),
            oidc_client_id: None,
            node_pools: Vec::new(),
            created_at: chrono::Utc::now(),
        });
    }

    /// Seed a cluster record as a finished creation would have left it.
    pub fn seed_running_cluster(
        &self,
        request: &ProvisioningRequest,
        subnet_ids: &[&str],
        external_address: &str,
    ) {
        self.clusters.insert(Cluster {
            id: request.cluster_id,
            uid: request.cluster_uid.clone(),
            name: request.cluster_name.clone(),
            organization_id: request.organization_id,
            region: request.region.clone(),
            status: ClusterStatus::Running,
            status_message: "cluster is running".to_string(),
            network: ClusterNetwork {
                vpc_id: Some("vpc-00000001".to_string()),
                subnet_ids: subnet_ids.iter().map(|s| s.to_string()).collect(),
                // The fake names created subnets "subnet-{zone}", so the
                // zone map a real creation persists is recoverable here.
                subnets_by_zone: subnet_ids
                    .iter()
                    .filter_map(|s| {
                        s.strip_prefix("subnet-").map(|z| (z.to_string(), s.to_string()))
                    })
                    .collect(),
                external_address: Some(external_address.to_string()),
            },
            oidc_client_id: None,
            node_pools: request.node_pools.clone(),
            created_at: chrono::Utc::now(),
        });
    }
}

// ============================================================================
// Request builders
// ============================================================================

pub fn pool(name: &str, role: NodePoolRole, count: u32) -> NodePoolSpec {
    NodePoolSpec {
        name: name.to_string(),
        role,
        min_count: 1,
        max_count: count.max(1),
        count,
        instance_type: "m5.large".to_string(),
        image: None,
        volume_size_gb: None,
        spot_price: None,
        autoscaling: false,
        zones: vec![format!("{REGION}a")],
        subnet_ids: Vec::new(),
        labels: BTreeMap::new(),
    }
}

pub fn master_pool(max_count: u32) -> NodePoolSpec {
    let mut p = pool("master", NodePoolRole::Master, 1);
    p.max_count = max_count;
    if max_count > 1 {
        p.count = max_count;
        p.min_count = max_count;
    }
    p
}

pub fn request(pools: Vec<NodePoolSpec>) -> ProvisioningRequest {
    ProvisioningRequest {
        organization_id: 1,
        cluster_id: 7,
        cluster_uid: "c-0007".to_string(),
        cluster_name: "demo".to_string(),
        provider: Provider::Amazon,
        region: REGION.to_string(),
        secret_id: "secret-aws".to_string(),
        ssh_secret_id: "secret-ssh".to_string(),
        node_pools: pools,
        oidc_enabled: false,
        base_url: None,
    }
}
